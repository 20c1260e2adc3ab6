//! Ordered inbound event sources. The stream treats a source as one partition:
//! events arrive in offset order and are committed by offset.

mod channel;
mod jsonl;

pub use channel::ChannelSource;
pub use jsonl::JsonLinesSource;

use crate::error::SourceError;
use async_trait::async_trait;

/// One raw event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Position within the source, starting at 0
    pub offset: u64,
    pub payload: String,
}

#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event; `None` once the source is exhausted.
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError>;

    /// Commit `offset`. Events at or before a committed offset are not redelivered.
    async fn acknowledge(&mut self, offset: u64) -> Result<(), SourceError>;
}
