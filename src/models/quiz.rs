use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

/// Response of `GET /quiz/:campaignId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quiz {
    pub campaign_id: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizSubmission {
    pub token: String,
    pub campaign_id: String,
    /// Selected option index per question, in question order.
    pub answers: Vec<usize>,
}

/// Response of `POST /quiz/submit`. The server grades; the client only
/// displays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizResult {
    pub correct: u32,
    pub total: u32,
    pub coins_earned: u64,
    pub new_balance: u64,
}

impl QuizResult {
    pub fn tier(&self) -> RewardTier {
        RewardTier::from_score(self.correct, self.total)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RewardTier {
    Perfect,
    Partial,
    None,
}

impl RewardTier {
    pub fn from_score(correct: u32, total: u32) -> Self {
        if total == 0 || correct == 0 {
            RewardTier::None
        } else if correct >= total {
            RewardTier::Perfect
        } else {
            RewardTier::Partial
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RewardTier::Perfect => "full reward",
            RewardTier::Partial => "partial reward",
            RewardTier::None => "no reward",
        }
    }
}
