use super::{EventSource, InboundEvent};
use crate::error::SourceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Newline-delimited JSON events; the line number is the offset.
///
/// With a checkpoint file the source stores the first uncommitted offset on
/// every acknowledge and skips everything before it on the next start, so a
/// crash between processing and acknowledge redelivers that line.
pub struct JsonLinesSource {
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    next_offset: u64,
    committed: u64,
    checkpoint: Option<PathBuf>,
}

async fn read_checkpoint(path: &Path) -> Result<u64, SourceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match raw.trim().parse() {
            Ok(offset) => Ok(offset),
            Err(_) => {
                warn!(path = %path.display(), "unreadable checkpoint, starting from the beginning");
                Ok(0)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

impl JsonLinesSource {
    pub async fn open(path: &Path, checkpoint: Option<PathBuf>) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await?;
        info!(path = %path.display(), "reading flow events from file");
        Self::from_reader(BufReader::new(file), checkpoint).await
    }

    /// Standard input, no checkpoint.
    pub fn stdin() -> Self {
        Self {
            reader: Box::new(BufReader::new(tokio::io::stdin())),
            next_offset: 0,
            committed: 0,
            checkpoint: None,
        }
    }

    pub async fn from_reader<R>(reader: R, checkpoint: Option<PathBuf>) -> Result<Self, SourceError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let committed = match &checkpoint {
            Some(path) => read_checkpoint(path).await?,
            None => 0,
        };
        let mut source = Self {
            reader: Box::new(reader),
            next_offset: 0,
            committed,
            checkpoint,
        };

        let mut line = String::new();
        while source.next_offset < committed {
            line.clear();
            if source.reader.read_line(&mut line).await? == 0 {
                break;
            }
            source.next_offset += 1;
        }
        if committed > 0 {
            info!(committed, skipped = source.next_offset, "resuming after checkpoint");
        }
        Ok(source)
    }

    /// First offset not yet acknowledged.
    pub fn committed(&self) -> u64 {
        self.committed
    }

    async fn store_checkpoint(committed: u64, path: &Path) -> Result<(), SourceError> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, committed.to_string()).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl EventSource for JsonLinesSource {
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let offset = self.next_offset;
        self.next_offset += 1;
        let payload = line.trim_end_matches(['\r', '\n']).to_string();
        Ok(Some(InboundEvent { offset, payload }))
    }

    async fn acknowledge(&mut self, offset: u64) -> Result<(), SourceError> {
        if offset < self.committed {
            return Ok(());
        }
        self.committed = offset + 1;
        if let Some(path) = &self.checkpoint {
            Self::store_checkpoint(self.committed, path).await?;
        }
        Ok(())
    }
}
