//! StreamForward Dispatch
//!
//! Publishes event envelopes to the event bus:
//! - BatchDispatcher: splits an ordered envelope list into bus-sized chunks and
//!   reconciles per-entry outcomes, failing fast on transport errors
//! - EventPublisher: the publish-call seam
//! - EventBridgePublisher: Amazon EventBridge `PutEvents` (feature `eventbridge`)
//! - InMemoryPublisher: scripted publisher for local runs and tests

pub mod dispatcher;
pub mod memory;

#[cfg(feature = "eventbridge")]
pub mod eventbridge;

use std::time::Duration;

use async_trait::async_trait;
use sf_common::{EntryOutcome, EventEnvelope};
use thiserror::Error;

pub use dispatcher::{BatchDispatcher, BatchDispatcherConfig, DispatchError, DispatchReport, EntryRejection};
pub use memory::{InMemoryPublisher, ScriptedResponse};

#[cfg(feature = "eventbridge")]
pub use eventbridge::EventBridgePublisher;

/// Failure of a publish call as a whole. No entry outcome is known.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Publish call timed out after {0:?}")]
    Timeout(Duration),
}

/// One publish call against the event bus.
///
/// Implementations return exactly one outcome per entry, in entry order, or a
/// `PublishError` when the call itself failed.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn put_events(&self, entries: &[EventEnvelope]) -> Result<Vec<EntryOutcome>, PublishError>;
}
