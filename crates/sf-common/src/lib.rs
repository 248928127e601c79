//! StreamForward shared types
//!
//! Data model shared by the forwarder crates:
//! - Change records as delivered by the key-value store's change stream
//! - Client profiles describing each logical event producer
//! - Outbound event envelopes and per-entry publish outcomes

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod logging;

/// Event source tag carried by records from the key-value store's stream
pub const DYNAMODB_EVENT_SOURCE: &str = "aws:dynamodb";

/// Maximum number of entries the event bus accepts in one publish call
pub const MAX_PUBLISH_BATCH: usize = 10;

// ============================================================================
// Change Stream Types
// ============================================================================

/// A single typed attribute value from a change-stream image.
///
/// The stream encodes each value as a one-key object such as `{"S": "abc"}`
/// or `{"N": "12.50"}`. The common scalar kinds get their own variant; every
/// other kind (binary, sets, lists, maps) is kept as its raw tagged JSON, as is
/// a scalar tag whose payload has the wrong shape (`{"NULL": false}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub enum AttributeValue {
    String(String),
    /// Decimal text exactly as the stream transmitted it
    Number(String),
    Boolean(bool),
    Null,
    Other(Value),
}

impl AttributeValue {
    /// Textual form used when flattening an image.
    ///
    /// | Variant | Text |
    /// |---|---|
    /// | `String` | verbatim |
    /// | `Number` | the transmitted decimal text, never re-parsed |
    /// | `Boolean` | `true` / `false` |
    /// | `Null` | `null` |
    /// | `Other` | compact JSON of the tagged wire value |
    pub fn to_display_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Number(n) => n.clone(),
            AttributeValue::Boolean(b) => b.to_string(),
            AttributeValue::Null => "null".to_string(),
            AttributeValue::Other(raw) => raw.to_string(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl TryFrom<Map<String, Value>> for AttributeValue {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "attribute value must carry exactly one type tag, found {}",
                map.len()
            ));
        }

        let (tag, value) = match map.into_iter().next() {
            Some(entry) => entry,
            None => return Err("attribute value is empty".to_string()),
        };

        match (tag.as_str(), value) {
            ("S", Value::String(s)) => Ok(AttributeValue::String(s)),
            ("N", Value::String(n)) => Ok(AttributeValue::Number(n)),
            ("N", Value::Number(n)) => Ok(AttributeValue::Number(n.to_string())),
            ("BOOL", Value::Bool(b)) => Ok(AttributeValue::Boolean(b)),
            ("NULL", Value::Bool(true)) => Ok(AttributeValue::Null),
            (_, value) => {
                let mut raw = Map::new();
                raw.insert(tag.clone(), value);
                Ok(AttributeValue::Other(Value::Object(raw)))
            }
        }
    }
}

pub type AttributeMap = HashMap<String, AttributeValue>;

/// Kind of row mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Modify,
    Remove,
    /// Any event name the stream may add later
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "INSERT"),
            ChangeType::Modify => write!(f, "MODIFY"),
            ChangeType::Remove => write!(f, "REMOVE"),
            ChangeType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Row images and stream metadata of one change
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamRecord {
    #[serde(default)]
    pub keys: AttributeMap,
    #[serde(default)]
    pub new_image: Option<AttributeMap>,
    #[serde(default)]
    pub old_image: Option<AttributeMap>,
    #[serde(default)]
    pub sequence_number: Option<String>,
}

/// One row mutation delivered by the change stream
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(rename = "eventID", default)]
    pub event_id: Option<String>,
    #[serde(rename = "eventName")]
    pub change_type: ChangeType,
    #[serde(default)]
    pub event_source: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    /// ARN-like path of the originating table stream. Empty when absent,
    /// which classifies as malformed.
    #[serde(rename = "eventSourceARN", default)]
    pub origin_resource_id: String,
    #[serde(rename = "dynamodb", default)]
    pub change: StreamRecord,
}

impl ChangeRecord {
    /// Whether the record came from the key-value store's stream.
    /// A record without an event source tag did not.
    pub fn is_from_key_value_stream(&self) -> bool {
        self.event_source.as_deref() == Some(DYNAMODB_EVENT_SOURCE)
    }

    pub fn new_image(&self) -> Option<&AttributeMap> {
        self.change.new_image.as_ref()
    }
}

/// A batch entry that could not be read as a [`ChangeRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableRecord {
    /// Index within the delivered batch
    pub position: usize,
    pub event_id: Option<String>,
    pub reason: String,
}

/// The batch handed to one invocation.
///
/// Records are decoded one at a time so a single bad entry cannot fail the
/// whole batch; entries that do not decode land in `undecodable`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawChangeStreamBatch")]
pub struct ChangeStreamBatch {
    pub records: Vec<ChangeRecord>,
    pub undecodable: Vec<UndecodableRecord>,
}

impl ChangeStreamBatch {
    /// Number of entries delivered, decodable or not
    pub fn len(&self) -> usize {
        self.records.len() + self.undecodable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct RawChangeStreamBatch {
    #[serde(rename = "Records", default)]
    records: Vec<Value>,
}

impl From<RawChangeStreamBatch> for ChangeStreamBatch {
    fn from(raw: RawChangeStreamBatch) -> Self {
        let mut batch = ChangeStreamBatch::default();

        for (position, value) in raw.records.into_iter().enumerate() {
            let event_id = value
                .get("eventID")
                .and_then(Value::as_str)
                .map(str::to_string);

            match serde_json::from_value::<ChangeRecord>(value) {
                Ok(record) => batch.records.push(record),
                Err(e) => batch.undecodable.push(UndecodableRecord {
                    position,
                    event_id,
                    reason: e.to_string(),
                }),
            }
        }

        batch
    }
}

// ============================================================================
// Client Profiles
// ============================================================================

/// Static configuration of one logical event producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub name: String,
    pub destination_bus_name: String,
    pub source_name: String,
    pub detail_type: String,
    pub environment_tag: String,
    pub table_prefix: String,
}

impl ClientProfile {
    /// Table-name segment that identifies this producer's table
    pub fn table_fragment(&self) -> String {
        format!("{}{}", self.table_prefix, self.environment_tag)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileSetError {
    #[error("Profiles '{first}' and '{second}' both claim table '{fragment}'")]
    DuplicateFragment {
        fragment: String,
        first: String,
        second: String,
    },

    #[error("Duplicate profile name: {0}")]
    DuplicateName(String),
}

/// Immutable, configuration-ordered set of client profiles keyed by table fragment.
///
/// Built once at process start and shared read-only between invocations.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    by_fragment: IndexMap<String, Arc<ClientProfile>>,
}

impl ProfileSet {
    pub fn new(profiles: impl IntoIterator<Item = ClientProfile>) -> Result<Self, ProfileSetError> {
        let mut by_fragment: IndexMap<String, Arc<ClientProfile>> = IndexMap::new();

        for profile in profiles {
            if by_fragment.values().any(|p| p.name == profile.name) {
                return Err(ProfileSetError::DuplicateName(profile.name));
            }

            let fragment = profile.table_fragment();
            if let Some(existing) = by_fragment.get(&fragment) {
                return Err(ProfileSetError::DuplicateFragment {
                    fragment,
                    first: existing.name.clone(),
                    second: profile.name,
                });
            }
            by_fragment.insert(fragment, Arc::new(profile));
        }

        Ok(Self { by_fragment })
    }

    /// Profile owning the given physical table name
    pub fn lookup(&self, table_name: &str) -> Option<&Arc<ClientProfile>> {
        self.by_fragment.get(table_name)
    }

    /// Profiles in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClientProfile>> {
        self.by_fragment.values()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        self.by_fragment.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_fragment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fragment.is_empty()
    }
}

// ============================================================================
// Outbound Types
// ============================================================================

/// One entry published to the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventEnvelope {
    #[serde(rename = "EventBusName")]
    pub bus_name: String,
    pub source: String,
    pub detail_type: String,
    #[serde(rename = "Detail")]
    pub detail_json: String,
}

/// Bus verdict for a single published entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Accepted { event_id: String },
    Rejected { error_code: String, error_message: String },
}

impl EntryOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EntryOutcome::Accepted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(name: &str, prefix: &str, env: &str) -> ClientProfile {
        ClientProfile {
            name: name.to_string(),
            destination_bus_name: "bus".to_string(),
            source_name: format!("com.test.{}", name),
            detail_type: "Created".to_string(),
            environment_tag: env.to_string(),
            table_prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_attribute_value_scalars() {
        let s: AttributeValue = serde_json::from_value(json!({"S": "alice"})).unwrap();
        let n: AttributeValue = serde_json::from_value(json!({"N": "12.50"})).unwrap();
        let b: AttributeValue = serde_json::from_value(json!({"BOOL": false})).unwrap();
        let null: AttributeValue = serde_json::from_value(json!({"NULL": true})).unwrap();

        assert_eq!(s.to_display_string(), "alice");
        assert_eq!(n.to_display_string(), "12.50");
        assert_eq!(b.to_display_string(), "false");
        assert_eq!(null, AttributeValue::Null);
        assert_eq!(null.to_display_string(), "null");
    }

    #[test]
    fn test_number_keeps_transmitted_precision() {
        let n: AttributeValue =
            serde_json::from_value(json!({"N": "12345678901234567890.000001"})).unwrap();
        assert_eq!(n.to_string(), "12345678901234567890.000001");
    }

    #[test]
    fn test_attribute_value_other_kinds() {
        let ss: AttributeValue = serde_json::from_value(json!({"SS": ["a", "b"]})).unwrap();
        assert_eq!(ss.to_display_string(), r#"{"SS":["a","b"]}"#);

        let m: AttributeValue =
            serde_json::from_value(json!({"M": {"k": {"S": "v"}}})).unwrap();
        assert!(matches!(m, AttributeValue::Other(_)));
    }

    #[test]
    fn test_attribute_value_rejects_bad_shapes() {
        assert!(serde_json::from_value::<AttributeValue>(json!({})).is_err());
        assert!(serde_json::from_value::<AttributeValue>(json!({"S": "a", "N": "1"})).is_err());
        assert!(serde_json::from_value::<AttributeValue>(json!("plain")).is_err());
    }

    #[test]
    fn test_wrong_shaped_scalar_kept_raw() {
        let null: AttributeValue = serde_json::from_value(json!({"NULL": false})).unwrap();
        assert_eq!(null.to_display_string(), r#"{"NULL":false}"#);

        let b: AttributeValue = serde_json::from_value(json!({"BOOL": "yes"})).unwrap();
        assert!(matches!(b, AttributeValue::Other(_)));
    }

    #[test]
    fn test_unlisted_event_name_and_missing_arn() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "eventID": "9",
            "eventName": "TTL_EXPIRE",
            "eventSource": "aws:dynamodb"
        }))
        .unwrap();

        assert_eq!(record.change_type, ChangeType::Unknown);
        assert_eq!(record.origin_resource_id, "");
    }

    #[test]
    fn test_batch_keeps_good_records_beside_bad_ones() {
        let batch: ChangeStreamBatch = serde_json::from_value(json!({
            "Records": [
                {"eventID": "1", "eventName": "INSERT", "eventSourceARN": "arn:x/T-dev"},
                {"eventID": "2", "eventName": 7, "eventSourceARN": "arn:x/T-dev"},
                {"eventID": "3", "eventName": "INSERT", "eventSourceARN": "arn:x/T-dev",
                 "dynamodb": {"NewImage": {"Id": "not-tagged"}}}
            ]
        }))
        .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].event_id.as_deref(), Some("1"));

        let positions: Vec<usize> = batch.undecodable.iter().map(|u| u.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(batch.undecodable[1].event_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_missing_event_source_is_not_from_stream() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "eventName": "INSERT",
            "eventSourceARN": "arn:x/EmployeeDataTable-dev/stream/1"
        }))
        .unwrap();
        assert!(!record.is_from_key_value_stream());
    }

    #[test]
    fn test_change_record_deserialize() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "eventID": "1",
            "eventName": "INSERT",
            "eventSource": "aws:dynamodb",
            "awsRegion": "us-east-1",
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/EmployeeDataTable-dev/stream/2024",
            "dynamodb": {
                "Keys": {"Id": {"S": "e-1"}},
                "NewImage": {"Id": {"S": "e-1"}, "Age": {"N": "31"}},
                "SequenceNumber": "100",
                "SizeBytes": 26,
                "StreamViewType": "NEW_IMAGE"
            }
        }))
        .unwrap();

        assert_eq!(record.change_type, ChangeType::Insert);
        assert!(record.is_from_key_value_stream());
        assert_eq!(record.new_image().map(|i| i.len()), Some(2));
        assert_eq!(record.change.sequence_number.as_deref(), Some("100"));
    }

    #[test]
    fn test_foreign_event_source() {
        let record: ChangeRecord = serde_json::from_value(json!({
            "eventName": "REMOVE",
            "eventSource": "aws:kinesis",
            "eventSourceARN": "arn:x/y"
        }))
        .unwrap();
        assert!(!record.is_from_key_value_stream());
        assert!(record.new_image().is_none());
    }

    #[test]
    fn test_profile_set_lookup_and_order() {
        let set = ProfileSet::new(vec![
            profile("employee", "EmployeeDataTable-", "dev"),
            profile("appreciation", "TenantAppreciationsTable-", "dev"),
        ])
        .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.lookup("EmployeeDataTable-dev").unwrap().name, "employee");
        assert!(set.lookup("EmployeeDataTable-prod").is_none());

        let names: Vec<&str> = set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["employee", "appreciation"]);
    }

    #[test]
    fn test_profile_set_rejects_duplicates() {
        let err = ProfileSet::new(vec![
            profile("a", "Table-", "dev"),
            profile("b", "Table-", "dev"),
        ])
        .unwrap_err();
        assert!(matches!(err, ProfileSetError::DuplicateFragment { .. }));

        let err = ProfileSet::new(vec![
            profile("a", "One-", "dev"),
            profile("a", "Two-", "dev"),
        ])
        .unwrap_err();
        assert_eq!(err, ProfileSetError::DuplicateName("a".to_string()));
    }

    #[test]
    fn test_envelope_serializes_like_bus_entry() {
        let envelope = EventEnvelope {
            bus_name: "bus".to_string(),
            source: "src".to_string(),
            detail_type: "dt".to_string(),
            detail_json: "{}".to_string(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"EventBusName": "bus", "Source": "src", "DetailType": "dt", "Detail": "{}"})
        );
    }
}
