//! In-memory event publisher.
//!
//! Records every publish call and answers from a script of responses; once the
//! script runs out, every entry is accepted with a sequential event id.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sf_common::{EntryOutcome, EventEnvelope};

use crate::{EventPublisher, PublishError};

/// Scripted answer for the next publish call
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    AcceptAll,
    /// Reject the entries at the given positions within the call
    Reject {
        positions: Vec<usize>,
        error_code: String,
        error_message: String,
    },
    /// Return these outcomes verbatim
    Outcomes(Vec<EntryOutcome>),
    /// Fail the call with a transport error
    Fail(String),
    /// Wait before accepting everything
    Stall(Duration),
}

#[derive(Default)]
pub struct InMemoryPublisher {
    calls: Mutex<Vec<Vec<EventEnvelope>>>,
    script: Mutex<VecDeque<ScriptedResponse>>,
    next_id: AtomicU64,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: ScriptedResponse) {
        self.script.lock().push_back(response);
    }

    /// Entries of every call so far, in call order
    pub fn calls(&self) -> Vec<Vec<EventEnvelope>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().iter().map(Vec::len).collect()
    }

    fn accept(&self) -> EntryOutcome {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        EntryOutcome::Accepted {
            event_id: format!("evt-{:06}", id),
        }
    }

    fn accept_all(&self, count: usize) -> Vec<EntryOutcome> {
        (0..count).map(|_| self.accept()).collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn put_events(&self, entries: &[EventEnvelope]) -> Result<Vec<EntryOutcome>, PublishError> {
        self.calls.lock().push(entries.to_vec());
        let response = self.script.lock().pop_front().unwrap_or(ScriptedResponse::AcceptAll);

        match response {
            ScriptedResponse::AcceptAll => Ok(self.accept_all(entries.len())),
            ScriptedResponse::Reject {
                positions,
                error_code,
                error_message,
            } => Ok((0..entries.len())
                .map(|i| {
                    if positions.contains(&i) {
                        EntryOutcome::Rejected {
                            error_code: error_code.clone(),
                            error_message: error_message.clone(),
                        }
                    } else {
                        self.accept()
                    }
                })
                .collect()),
            ScriptedResponse::Outcomes(outcomes) => Ok(outcomes),
            ScriptedResponse::Fail(message) => Err(PublishError::Transport(message)),
            ScriptedResponse::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.accept_all(entries.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            bus_name: "bus".to_string(),
            source: "src".to_string(),
            detail_type: "dt".to_string(),
            detail_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_default_accepts_with_sequential_ids() {
        let publisher = InMemoryPublisher::new();
        let outcomes = tokio_test::block_on(publisher.put_events(&[envelope(), envelope()])).unwrap();

        assert_eq!(
            outcomes,
            vec![
                EntryOutcome::Accepted { event_id: "evt-000001".to_string() },
                EntryOutcome::Accepted { event_id: "evt-000002".to_string() },
            ]
        );
        assert_eq!(publisher.call_sizes(), vec![2]);
    }

    #[test]
    fn test_script_is_consumed_in_order() {
        let publisher = InMemoryPublisher::new();
        publisher.push_response(ScriptedResponse::Fail("down".to_string()));

        let first = tokio_test::block_on(publisher.put_events(&[envelope()]));
        let second = tokio_test::block_on(publisher.put_events(&[envelope()]));

        assert_eq!(first, Err(PublishError::Transport("down".to_string())));
        assert!(second.unwrap()[0].is_accepted());
        assert_eq!(publisher.call_count(), 2);
    }
}
