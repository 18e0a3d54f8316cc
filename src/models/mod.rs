mod campaign;
mod claim;
mod heartbeat;
mod quiz;
mod session;

pub use campaign::{CampaignSnapshot, StartVisit, WalletBalance};
pub use claim::{ClaimRequest, ClaimResult};
pub use heartbeat::HeartbeatPayload;
pub use quiz::{Quiz, QuizQuestion, QuizResult, QuizSubmission, RewardTier};
pub use session::{VisitRecord, VisitStatus};
