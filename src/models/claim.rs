use serde::{Deserialize, Serialize};

/// Same metric keys as the heartbeat body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub token: String,
    pub active_time: u64,
    pub mouse_movements: u64,
}

/// Returned once per session by `POST /earn/claim`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimResult {
    pub coins_earned: u64,
    pub new_balance: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_heartbeat_keys_and_result_stays_snake_case() {
        let request = ClaimRequest {
            token: "tok".into(),
            active_time: 30,
            mouse_movements: 4,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["activeTime"], 30);
        assert_eq!(value["mouseMovements"], 4);
        assert!(value.get("active_time").is_none());

        let result: ClaimResult =
            serde_json::from_str(r#"{"coins_earned":5,"new_balance":105}"#).unwrap();
        assert_eq!(result.new_balance, 105);
    }
}
