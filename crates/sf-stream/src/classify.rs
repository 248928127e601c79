//! Source Classifier
//!
//! Resource ids look like
//! `arn:aws:dynamodb:<region>:<account>:table/<TableName>/stream/<label>`;
//! the table name is the second `/`-separated segment.

use std::sync::Arc;

use sf_common::{ClientProfile, ProfileSet};

use crate::error::ClassifyError;

pub fn table_name(resource_id: &str) -> Result<&str, ClassifyError> {
    resource_id
        .split('/')
        .nth(1)
        .ok_or_else(|| ClassifyError::MalformedResourceId(resource_id.to_string()))
}

/// Profile owning the table the record came from. Never guesses.
pub fn classify<'a>(
    resource_id: &str,
    profiles: &'a ProfileSet,
) -> Result<&'a Arc<ClientProfile>, ClassifyError> {
    let table = table_name(resource_id)?;
    profiles
        .lookup(table)
        .ok_or_else(|| ClassifyError::UnknownSource {
            table: table.to_string(),
            resource_id: resource_id.to_string(),
        })
}
