use serde::{Deserialize, Serialize};

/// Periodic, non-authoritative telemetry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub token: String,
    pub active_time: u64,
    pub mouse_movements: u64,
    pub verification_passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let payload = HeartbeatPayload {
            token: "tok".into(),
            active_time: 12,
            mouse_movements: 3,
            verification_passed: false,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["activeTime"], 12);
        assert_eq!(value["mouseMovements"], 3);
        assert_eq!(value["verificationPassed"], false);
    }
}
