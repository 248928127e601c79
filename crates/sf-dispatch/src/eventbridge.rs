//! Amazon EventBridge publisher

use async_trait::async_trait;
use aws_sdk_eventbridge::error::DisplayErrorContext;
use aws_sdk_eventbridge::types::{PutEventsRequestEntry, PutEventsResultEntry};
use aws_sdk_eventbridge::Client;
use sf_common::{EntryOutcome, EventEnvelope};
use tracing::debug;

use crate::{EventPublisher, PublishError};

pub struct EventBridgePublisher {
    client: Client,
}

impl EventBridgePublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

fn to_request_entry(envelope: &EventEnvelope) -> PutEventsRequestEntry {
    PutEventsRequestEntry::builder()
        .event_bus_name(&envelope.bus_name)
        .source(&envelope.source)
        .detail_type(&envelope.detail_type)
        .detail(&envelope.detail_json)
        .build()
}

fn to_outcome(entry: &PutEventsResultEntry) -> EntryOutcome {
    match (entry.event_id(), entry.error_code(), entry.error_message()) {
        (Some(event_id), None, None) => EntryOutcome::Accepted {
            event_id: event_id.to_string(),
        },
        (_, code, message) if code.is_some() || message.is_some() => EntryOutcome::Rejected {
            error_code: code.unwrap_or("Unknown").to_string(),
            error_message: message.unwrap_or_default().to_string(),
        },
        _ => EntryOutcome::Rejected {
            error_code: "MissingEventId".to_string(),
            error_message: "bus returned neither an event id nor an error".to_string(),
        },
    }
}

#[async_trait]
impl EventPublisher for EventBridgePublisher {
    async fn put_events(&self, entries: &[EventEnvelope]) -> Result<Vec<EntryOutcome>, PublishError> {
        let request_entries: Vec<PutEventsRequestEntry> = entries.iter().map(to_request_entry).collect();

        let output = self
            .client
            .put_events()
            .set_entries(Some(request_entries))
            .send()
            .await
            .map_err(|e| PublishError::Transport(DisplayErrorContext(&e).to_string()))?;

        let outcomes: Vec<EntryOutcome> = output.entries().iter().map(to_outcome).collect();
        debug!(
            "PutEvents returned {} entries, {} failed",
            outcomes.len(),
            outcomes.iter().filter(|o| !o.is_accepted()).count()
        );

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_entry_copies_envelope() {
        let envelope = EventEnvelope {
            bus_name: "tenant-bus".to_string(),
            source: "com.tenant.employee".to_string(),
            detail_type: "EmployeeCreated".to_string(),
            detail_json: r#"{"Id":"e-1"}"#.to_string(),
        };
        let entry = to_request_entry(&envelope);

        assert_eq!(entry.event_bus_name(), Some("tenant-bus"));
        assert_eq!(entry.source(), Some("com.tenant.employee"));
        assert_eq!(entry.detail_type(), Some("EmployeeCreated"));
        assert_eq!(entry.detail(), Some(r#"{"Id":"e-1"}"#));
    }

    #[test]
    fn test_result_entry_outcomes() {
        let accepted = PutEventsResultEntry::builder().event_id("abc").build();
        assert_eq!(
            to_outcome(&accepted),
            EntryOutcome::Accepted { event_id: "abc".to_string() }
        );

        let rejected = PutEventsResultEntry::builder()
            .error_code("InternalFailure")
            .error_message("boom")
            .build();
        assert_eq!(
            to_outcome(&rejected),
            EntryOutcome::Rejected {
                error_code: "InternalFailure".to_string(),
                error_message: "boom".to_string(),
            }
        );

        let empty = PutEventsResultEntry::builder().build();
        assert!(!to_outcome(&empty).is_accepted());
    }
}
