//! Pipeline Driver
//!
//! One call to [`PipelineDriver::handle`] processes one change-stream batch in
//! two phases:
//!
//! 1. **Scanning**: every record is checked, classified, flattened and turned
//!    into an envelope on its profile's queue. A record that fails any step,
//!    including one that could not be decoded at all, is logged, counted and
//!    skipped.
//! 2. **Flushing**: each profile's queue is handed to the dispatcher, in
//!    configuration order. Profiles with nothing queued dispatch an empty
//!    sequence, which sends nothing.
//!
//! A dispatch failure ends the invocation with an error so the runtime can
//! redrive the batch. There is no retry loop here.

use std::sync::Arc;

use indexmap::IndexMap;
use sf_common::{ChangeRecord, ChangeStreamBatch, ChangeType, ClientProfile, EventEnvelope, ProfileSet};
use sf_dispatch::{BatchDispatcher, DispatchReport};
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::envelope::build_envelope;
use crate::error::{ClassifyError, DriverError};
use crate::flatten::flatten_to_json;

/// Records dropped during scanning, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    /// Entries in the batch that did not decode as change records
    pub undecodable: usize,
    /// MODIFY, REMOVE and unrecognised event names
    pub not_insert: usize,
    /// Records from an event source other than the key-value store
    pub foreign_source: usize,
    pub malformed_resource_id: usize,
    pub unknown_source: usize,
    pub serialization: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.undecodable
            + self.not_insert
            + self.foreign_source
            + self.malformed_resource_id
            + self.unknown_source
            + self.serialization
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDispatch {
    pub profile: String,
    pub report: DispatchReport,
}

/// What one invocation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationSummary {
    pub records_scanned: usize,
    pub envelopes_built: usize,
    pub skipped: SkipCounts,
    /// One entry per configured profile, in configuration order
    pub dispatches: Vec<ProfileDispatch>,
}

impl InvocationSummary {
    pub fn report_for(&self, profile: &str) -> Option<&DispatchReport> {
        self.dispatches
            .iter()
            .find(|d| d.profile == profile)
            .map(|d| &d.report)
    }

    pub fn publish_calls(&self) -> usize {
        self.dispatches.iter().map(|d| d.report.publish_calls).sum()
    }

    pub fn accepted(&self) -> usize {
        self.dispatches.iter().map(|d| d.report.accepted.len()).sum()
    }

    pub fn rejected(&self) -> usize {
        self.dispatches.iter().map(|d| d.report.rejected.len()).sum()
    }
}

/// Envelopes waiting for one profile's flush
struct ProfileQueue {
    profile: Arc<ClientProfile>,
    envelopes: Vec<EventEnvelope>,
}

pub struct PipelineDriver {
    profiles: Arc<ProfileSet>,
    dispatcher: BatchDispatcher,
}

impl PipelineDriver {
    pub fn new(profiles: Arc<ProfileSet>, dispatcher: BatchDispatcher) -> Self {
        Self {
            profiles,
            dispatcher,
        }
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub async fn handle(&self, batch: &ChangeStreamBatch) -> Result<InvocationSummary, DriverError> {
        info!("Processing batch of {} change records", batch.len());

        let mut summary = InvocationSummary::default();
        let queues = self.scan(batch, &mut summary);
        self.flush(queues, &mut summary).await?;

        info!(
            "Batch complete: {} scanned, {} forwarded, {} skipped, {} accepted, {} rejected",
            summary.records_scanned,
            summary.envelopes_built,
            summary.skipped.total(),
            summary.accepted(),
            summary.rejected()
        );
        Ok(summary)
    }

    fn scan(&self, batch: &ChangeStreamBatch, summary: &mut InvocationSummary) -> IndexMap<String, ProfileQueue> {
        let mut queues: IndexMap<String, ProfileQueue> = self
            .profiles
            .iter()
            .map(|profile| {
                (
                    profile.name.clone(),
                    ProfileQueue {
                        profile: Arc::clone(profile),
                        envelopes: Vec::new(),
                    },
                )
            })
            .collect();

        for undecodable in &batch.undecodable {
            summary.records_scanned += 1;
            error!(
                "Skipping undecodable record {:?} at position {}: {}",
                undecodable.event_id, undecodable.position, undecodable.reason
            );
            summary.skipped.undecodable += 1;
        }

        for record in &batch.records {
            summary.records_scanned += 1;

            let Some((profile, envelope)) = self.forward(record, &mut summary.skipped) else {
                continue;
            };

            queues
                .entry(profile.name.clone())
                .or_insert_with(|| ProfileQueue {
                    profile: Arc::clone(profile),
                    envelopes: Vec::new(),
                })
                .envelopes
                .push(envelope);
            summary.envelopes_built += 1;
        }

        queues
    }

    /// Owning profile and envelope for a forwardable record
    fn forward<'a>(
        &'a self,
        record: &ChangeRecord,
        skipped: &mut SkipCounts,
    ) -> Option<(&'a Arc<ClientProfile>, EventEnvelope)> {
        if !record.is_from_key_value_stream() {
            info!(
                "Skipping record from event source {:?}",
                record.event_source.as_deref().unwrap_or_default()
            );
            skipped.foreign_source += 1;
            return None;
        }

        let profile = match classify(&record.origin_resource_id, &self.profiles) {
            Ok(profile) => profile,
            Err(e @ ClassifyError::MalformedResourceId(_)) => {
                warn!("Skipping record {:?}: {}", record.event_id, e);
                skipped.malformed_resource_id += 1;
                return None;
            }
            Err(e @ ClassifyError::UnknownSource { .. }) => {
                info!("Skipping record {:?}, unknown source: {}", record.event_id, e);
                skipped.unknown_source += 1;
                return None;
            }
        };
        debug!("Record {:?} belongs to profile {}", record.event_id, profile.name);

        if record.change_type != ChangeType::Insert {
            info!(
                "Skipping {} record {:?} for profile {}",
                record.change_type, record.event_id, profile.name
            );
            skipped.not_insert += 1;
            return None;
        }

        let detail_json = match flatten_to_json(record.new_image()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to convert record {:?} to JSON: {}", record.event_id, e);
                skipped.serialization += 1;
                return None;
            }
        };

        Some((profile, build_envelope(profile, detail_json)))
    }

    async fn flush(
        &self,
        queues: IndexMap<String, ProfileQueue>,
        summary: &mut InvocationSummary,
    ) -> Result<(), DriverError> {
        for (name, queue) in queues {
            let report = self
                .dispatcher
                .dispatch(&name, queue.envelopes)
                .await
                .map_err(|source| {
                    error!(
                        "Failed to send events for profile {} to bus {}: {}",
                        name, queue.profile.destination_bus_name, source
                    );
                    DriverError::Dispatch {
                        profile: name.clone(),
                        source,
                    }
                })?;

            summary.dispatches.push(ProfileDispatch {
                profile: name,
                report,
            });
        }
        Ok(())
    }
}
