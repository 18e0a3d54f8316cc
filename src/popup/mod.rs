//! Secondary-window handling for campaign visits.
//!
//! Hosts give no reliable cross-window close notification, so the
//! monitor polls the window's closed state on a short fixed interval.
//! Polling is deliberate here, not a stopgap.

mod monitor;
mod simulated;

use std::sync::Arc;

pub use monitor::{PopupEvent, PopupMonitor};
pub use simulated::{SimulatedWindow, SimulatedWindowHost};

/// A browser window opened for a campaign URL.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn focus(&self);
    fn close(&self);
}

/// Whatever can open secondary windows: a browser shell, a webview, or
/// the console simulator.
pub trait WindowHost: Send + Sync {
    /// `None` means the host refused to create the window (popup blocker).
    /// The host keeps the strong reference; callers only hold it weakly.
    fn open(&self, url: &str, name: &str) -> Option<Arc<dyn PopupWindow>>;
}
