//! Batch Dispatcher
//!
//! Sends one profile's envelopes to the event bus in chunks no larger than the
//! bus's per-call limit. Chunks go out sequentially in input order.
//!
//! Outcome handling is asymmetric:
//! - a failed publish call aborts the dispatch, later chunks are not sent
//! - rejected entries inside a successful call are logged and counted, and
//!   the dispatch carries on with the next chunk

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sf_common::{EntryOutcome, EventEnvelope, MAX_PUBLISH_BATCH};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{EventPublisher, PublishError};

/// Error code recorded when the bus returns fewer outcomes than entries sent
pub const MISSING_OUTCOME_CODE: &str = "MissingOutcome";

#[derive(Debug, Clone)]
pub struct BatchDispatcherConfig {
    /// Entries per publish call, clamped to `1..=MAX_PUBLISH_BATCH`
    pub chunk_limit: usize,
    /// Upper bound for a single publish call
    pub publish_timeout: Option<Duration>,
}

impl Default for BatchDispatcherConfig {
    fn default() -> Self {
        Self {
            chunk_limit: MAX_PUBLISH_BATCH,
            publish_timeout: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Publish call for chunk {chunk} of {total_chunks} failed: {source}")]
    Transport {
        chunk: usize,
        total_chunks: usize,
        #[source]
        source: PublishError,
    },
}

/// An entry the bus refused while accepting the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRejection {
    /// Index of the entry in the dispatched sequence
    pub position: usize,
    pub error_code: String,
    pub error_message: String,
}

impl fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry {} rejected: {} ({})",
            self.position, self.error_code, self.error_message
        )
    }
}

/// Result of a completed dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub publish_calls: usize,
    /// Event ids of accepted entries, in dispatch order
    pub accepted: Vec<String>,
    pub rejected: Vec<EntryRejection>,
}

impl DispatchReport {
    pub fn entries(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct BatchDispatcher {
    publisher: Arc<dyn EventPublisher>,
    config: BatchDispatcherConfig,
}

impl BatchDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>, config: BatchDispatcherConfig) -> Self {
        let chunk_limit = config.chunk_limit.clamp(1, MAX_PUBLISH_BATCH);
        if chunk_limit != config.chunk_limit {
            warn!(
                "Chunk limit {} out of range, using {}",
                config.chunk_limit, chunk_limit
            );
        }

        Self {
            publisher,
            config: BatchDispatcherConfig {
                chunk_limit,
                ..config
            },
        }
    }

    pub fn chunk_limit(&self) -> usize {
        self.config.chunk_limit
    }

    /// Publish `envelopes` in order. `label` names the destination in logs.
    pub async fn dispatch(
        &self,
        label: &str,
        envelopes: Vec<EventEnvelope>,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        if envelopes.is_empty() {
            debug!("[{}] No events to send", label);
            return Ok(report);
        }

        let total_chunks = envelopes.len().div_ceil(self.config.chunk_limit);
        info!(
            "[{}] Dispatching {} events in {} chunk(s)",
            label,
            envelopes.len(),
            total_chunks
        );

        for (index, chunk) in envelopes.chunks(self.config.chunk_limit).enumerate() {
            let chunk_number = index + 1;
            let offset = index * self.config.chunk_limit;

            for entry in chunk {
                debug!(
                    "[{}] Chunk {}/{} entry: {}",
                    label,
                    chunk_number,
                    total_chunks,
                    serde_json::to_string(entry).unwrap_or_default()
                );
            }

            report.publish_calls += 1;
            let outcomes = match self.publish_chunk(chunk).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    error!(
                        "[{}] Could not send chunk {}/{} ({} events): {}",
                        label,
                        chunk_number,
                        total_chunks,
                        chunk.len(),
                        e
                    );
                    return Err(DispatchError::Transport {
                        chunk: chunk_number,
                        total_chunks,
                        source: e,
                    });
                }
            };

            self.reconcile(label, offset, chunk.len(), outcomes, &mut report);
        }

        if report.is_fully_accepted() {
            info!(
                "[{}] Sent {} events in {} publish call(s)",
                label,
                report.accepted.len(),
                report.publish_calls
            );
        } else {
            warn!(
                "[{}] Sent {} events in {} publish call(s), {} rejected by the bus",
                label,
                report.accepted.len(),
                report.publish_calls,
                report.rejected.len()
            );
        }

        Ok(report)
    }

    async fn publish_chunk(&self, chunk: &[EventEnvelope]) -> Result<Vec<EntryOutcome>, PublishError> {
        match self.config.publish_timeout {
            Some(limit) => match timeout(limit, self.publisher.put_events(chunk)).await {
                Ok(result) => result,
                Err(_) => Err(PublishError::Timeout(limit)),
            },
            None => self.publisher.put_events(chunk).await,
        }
    }

    /// Record per-entry outcomes of one accepted call
    fn reconcile(
        &self,
        label: &str,
        offset: usize,
        sent: usize,
        outcomes: Vec<EntryOutcome>,
        report: &mut DispatchReport,
    ) {
        if outcomes.len() > sent {
            warn!(
                "[{}] Bus returned {} outcomes for {} entries, ignoring the surplus",
                label,
                outcomes.len(),
                sent
            );
        }

        let mut outcomes = outcomes.into_iter();
        for slot in 0..sent {
            let position = offset + slot;
            match outcomes.next() {
                Some(EntryOutcome::Accepted { event_id }) => {
                    info!("[{}] Sent event to bus with event id: {}", label, event_id);
                    report.accepted.push(event_id);
                }
                Some(EntryOutcome::Rejected {
                    error_code,
                    error_message,
                }) => {
                    let rejection = EntryRejection {
                        position,
                        error_code,
                        error_message,
                    };
                    warn!("[{}] Could not send event: {}", label, rejection);
                    report.rejected.push(rejection);
                }
                None => {
                    let rejection = EntryRejection {
                        position,
                        error_code: MISSING_OUTCOME_CODE.to_string(),
                        error_message: "bus returned no outcome for this entry".to_string(),
                    };
                    warn!("[{}] Could not confirm event: {}", label, rejection);
                    report.rejected.push(rejection);
                }
            }
        }
    }
}
