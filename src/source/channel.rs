use super::{EventSource, InboundEvent};
use crate::error::SourceError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// In-process source fed through a tokio channel. Only the latest acknowledged
/// offset is kept; test builds also record the full acknowledge history.
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
    next_offset: u64,
    last_acknowledged: Option<u64>,
    #[cfg(test)]
    history: Vec<u64>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self {
            rx,
            next_offset: 0,
            last_acknowledged: None,
            #[cfg(test)]
            history: Vec::new(),
        }
    }

    /// Sender plus a source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    pub fn last_acknowledged(&self) -> Option<u64> {
        self.last_acknowledged
    }

    #[cfg(test)]
    pub(crate) fn acknowledged(&self) -> &[u64] {
        &self.history
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        Ok(self.rx.recv().await.map(|payload| {
            let offset = self.next_offset;
            self.next_offset += 1;
            InboundEvent { offset, payload }
        }))
    }

    async fn acknowledge(&mut self, offset: u64) -> Result<(), SourceError> {
        self.last_acknowledged = Some(self.last_acknowledged.map_or(offset, |last| last.max(offset)));
        #[cfg(test)]
        self.history.push(offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offsets_follow_send_order() {
        let (tx, mut src) = ChannelSource::channel(4);
        tx.send("a".into()).await.unwrap();
        tx.send("b".into()).await.unwrap();
        drop(tx);

        let first = src.next_event().await.unwrap().unwrap();
        let second = src.next_event().await.unwrap().unwrap();
        assert_eq!((first.offset, first.payload.as_str()), (0, "a"));
        assert_eq!((second.offset, second.payload.as_str()), (1, "b"));
        assert!(src.next_event().await.unwrap().is_none());

        assert_eq!(src.last_acknowledged(), None);
        src.acknowledge(1).await.unwrap();
        src.acknowledge(0).await.unwrap();
        assert_eq!(src.acknowledged(), &[1, 0]);
        assert_eq!(src.last_acknowledged(), Some(1));
    }
}
