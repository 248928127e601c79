//! Envelope Builder

use sf_common::{ClientProfile, EventEnvelope};

/// Outbound entry for one forwarded record; routing fields come from the profile
pub fn build_envelope(profile: &ClientProfile, detail_json: String) -> EventEnvelope {
    EventEnvelope {
        bus_name: profile.destination_bus_name.clone(),
        source: profile.source_name.clone(),
        detail_type: profile.detail_type.clone(),
        detail_json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_copies_profile_routing() {
        let profile = ClientProfile {
            name: "employee".to_string(),
            destination_bus_name: "tenant-bus-dev".to_string(),
            source_name: "com.tenant.employee".to_string(),
            detail_type: "EmployeeCreated".to_string(),
            environment_tag: "dev".to_string(),
            table_prefix: "EmployeeDataTable-".to_string(),
        };

        let envelope = build_envelope(&profile, r#"{"Id":"e-1"}"#.to_string());
        assert_eq!(envelope.bus_name, "tenant-bus-dev");
        assert_eq!(envelope.source, "com.tenant.employee");
        assert_eq!(envelope.detail_type, "EmployeeCreated");
        assert_eq!(envelope.detail_json, r#"{"Id":"e-1"}"#);
    }
}
