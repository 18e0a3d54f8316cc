use serde::{Deserialize, Serialize};

/// Campaign as returned alongside a freshly issued verification token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignSnapshot {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    /// Required watch time before the reward can be claimed.
    pub watch_duration_seconds: u64,
    #[serde(default)]
    pub coins_per_visit: u64,
}

/// Response of `POST /earn/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartVisit {
    pub token: String,
    pub campaign: CampaignSnapshot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletBalance {
    pub balance: u64,
}
