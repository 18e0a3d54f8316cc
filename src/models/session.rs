//! Local history of visit attempts, kept in the write-behind cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VisitStatus {
    Active,
    Claimed,
    Cancelled,
    Abandoned,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Active => "Active",
            VisitStatus::Claimed => "Claimed",
            VisitStatus::Cancelled => "Cancelled",
            VisitStatus::Abandoned => "Abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(VisitStatus::Active),
            "Claimed" => Some(VisitStatus::Claimed),
            "Cancelled" => Some(VisitStatus::Cancelled),
            "Abandoned" => Some(VisitStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub id: String,
    pub campaign_id: String,
    pub status: VisitStatus,
    pub required_secs: u64,
    pub elapsed_secs: u64,
    pub coins_earned: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
