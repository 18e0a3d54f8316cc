pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{GatewayEvent, VisitController, VisitSnapshot};
pub use state::{EngagementTimer, PauseReasons, TickOutcome, TimerPhase};
