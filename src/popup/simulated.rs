use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use super::{PopupWindow, WindowHost};

const ENABLE_LOGS: bool = true;
use crate::log_info;

/// Window whose lifecycle is driven by console commands or tests.
#[derive(Debug)]
pub struct SimulatedWindow {
    pub url: String,
    pub name: String,
    closed: AtomicBool,
    focus_count: AtomicUsize,
}

impl SimulatedWindow {
    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    /// The user closing the window by hand.
    pub fn close_by_user(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl PopupWindow for SimulatedWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn focus(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
        log_info!("focusing popup {}", self.name);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        log_info!("popup {} closed by session", self.name);
    }
}

#[derive(Default)]
pub struct SimulatedWindowHost {
    block_popups: AtomicBool,
    windows: Mutex<Vec<Arc<SimulatedWindow>>>,
    opens: AtomicUsize,
}

impl SimulatedWindowHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_blocking(&self, block: bool) {
        self.block_popups.store(block, Ordering::SeqCst);
    }

    pub fn latest(&self) -> Option<Arc<SimulatedWindow>> {
        self.windows.lock().ok()?.last().cloned()
    }

    /// Windows opened over the host's lifetime, including forgotten ones.
    pub fn opened_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Closes every open window; returns how many were still open.
    pub fn close_all(&self) -> usize {
        let Ok(windows) = self.windows.lock() else {
            return 0;
        };
        windows
            .iter()
            .filter(|window| !window.is_closed())
            .map(|window| window.close_by_user())
            .count()
    }

    /// Drops closed windows so their weak handles go stale.
    pub fn forget_closed(&self) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.retain(|window| !window.is_closed());
        }
    }
}

impl WindowHost for SimulatedWindowHost {
    fn open(&self, url: &str, name: &str) -> Option<Arc<dyn PopupWindow>> {
        if self.block_popups.load(Ordering::SeqCst) {
            log_info!("popup for {url} blocked by host");
            return None;
        }

        let window = Arc::new(SimulatedWindow {
            url: url.to_string(),
            name: name.to_string(),
            closed: AtomicBool::new(false),
            focus_count: AtomicUsize::new(0),
        });
        self.windows.lock().ok()?.push(window.clone());
        self.opens.fetch_add(1, Ordering::SeqCst);
        log_info!("opened popup {name} at {url}");
        Some(window as Arc<dyn PopupWindow>)
    }
}
