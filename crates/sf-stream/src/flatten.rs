//! Record Flattener

use std::collections::BTreeMap;

use sf_common::AttributeMap;

use crate::error::FlattenError;

/// Attribute name to textual value, ordered by name
pub type FlattenedPayload = BTreeMap<String, String>;

pub fn flatten_image(image: &AttributeMap) -> FlattenedPayload {
    image
        .iter()
        .map(|(name, value)| (name.clone(), value.to_display_string()))
        .collect()
}

/// Flatten an image and serialize it. A missing image yields `{}`.
pub fn flatten_to_json(image: Option<&AttributeMap>) -> Result<String, FlattenError> {
    let payload = image.map(flatten_image).unwrap_or_default();
    Ok(serde_json::to_string(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(value: serde_json::Value) -> AttributeMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_flatten_mixed_kinds() {
        let image = image(json!({
            "EmployeeId": {"S": "e-42"},
            "Salary": {"N": "1050.75"},
            "Active": {"BOOL": true},
            "Manager": {"NULL": true},
            "Skills": {"SS": ["rust", "go"]}
        }));

        let json = flatten_to_json(Some(&image)).unwrap();
        assert_eq!(
            json,
            r#"{"Active":"true","EmployeeId":"e-42","Manager":"null","Salary":"1050.75","Skills":"{\"SS\":[\"rust\",\"go\"]}"}"#
        );
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let image = image(json!({
            "b": {"S": "2"},
            "a": {"N": "1"},
            "c": {"L": [{"S": "x"}]}
        }));

        let first = flatten_to_json(Some(&image)).unwrap();
        let second = flatten_to_json(Some(&image)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_image_is_empty_object() {
        assert_eq!(flatten_to_json(None).unwrap(), "{}");
        assert_eq!(flatten_to_json(Some(&AttributeMap::new())).unwrap(), "{}");
    }

    #[test]
    fn test_string_values_are_escaped() {
        let image = image(json!({"Note": {"S": "say \"hi\"\n"}}));
        let json = flatten_to_json(Some(&image)).unwrap();

        let parsed: FlattenedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["Note"], "say \"hi\"\n");
    }
}
