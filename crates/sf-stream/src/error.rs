//! Pipeline Error Types

use sf_dispatch::DispatchError;
use thiserror::Error;

/// Record-scoped: the record is dropped and the batch continues
#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Record-scoped: the record is dropped and the batch continues
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Invalid resource id format: {0}")]
    MalformedResourceId(String),

    #[error("Unknown source table '{table}' in {resource_id}")]
    UnknownSource { table: String, resource_id: String },
}

/// Invocation-fatal: returned to the runtime so it can redrive the batch
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Dispatch for profile '{profile}' failed: {source}")]
    Dispatch {
        profile: String,
        #[source]
        source: DispatchError,
    },
}
