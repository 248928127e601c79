//! StreamForward change-stream pipeline
//!
//! Turns a batch of change records into event-bus envelopes:
//! - flatten: typed row images to flat string-keyed JSON
//! - classify: origin resource id to the owning client profile
//! - envelope: classified INSERT records to outbound entries
//! - driver: per-invocation scan of the batch and per-profile flush

pub mod classify;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod flatten;

pub use classify::{classify, table_name};
pub use driver::{InvocationSummary, PipelineDriver, ProfileDispatch, SkipCounts};
pub use envelope::build_envelope;
pub use error::{ClassifyError, DriverError, FlattenError};
pub use flatten::{flatten_image, flatten_to_json, FlattenedPayload};
