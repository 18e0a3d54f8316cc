use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, GatewayResult};

use super::{PopupWindow, WindowHost};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupEvent {
    /// Sent once per opened window. `generation` identifies which open
    /// call it belongs to so a late event cannot close a reopened popup.
    Closed { generation: u64 },
}

/// Owns the session's popup: opening, focusing, polling for closure.
pub struct PopupMonitor {
    host: Arc<dyn WindowHost>,
    poll_interval: Duration,
    events_tx: mpsc::UnboundedSender<PopupEvent>,
    window: Option<Weak<dyn PopupWindow>>,
    target: Option<(String, String)>,
    generation: u64,
    poller: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PopupMonitor {
    pub fn new(
        host: Arc<dyn WindowHost>,
        poll_interval: Duration,
        events_tx: mpsc::UnboundedSender<PopupEvent>,
    ) -> Self {
        Self {
            host,
            poll_interval,
            events_tx,
            window: None,
            target: None,
            generation: 0,
            poller: None,
            cancel_token: None,
        }
    }

    pub fn open(&mut self, url: &str, session_key: &str) -> GatewayResult<()> {
        self.target = Some((url.to_string(), format!("visit-{session_key}")));
        self.launch()
    }

    /// Focuses the popup if it is still alive, otherwise opens it again.
    /// Tolerates a missing or stale handle.
    pub fn reopen(&mut self) -> GatewayResult<()> {
        if self.focus() {
            return Ok(());
        }
        self.launch()
    }

    pub fn focus(&self) -> bool {
        match self.live_window() {
            Some(window) => {
                window.focus();
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.live_window().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Closes the window this monitor opened, if it is still open.
    pub fn close(&mut self) {
        self.stop_polling();
        if let Some(window) = self.live_window() {
            window.close();
        }
        self.window = None;
    }

    pub fn stop_polling(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }

    fn live_window(&self) -> Option<Arc<dyn PopupWindow>> {
        self.window
            .as_ref()?
            .upgrade()
            .filter(|window| !window.is_closed())
    }

    fn launch(&mut self) -> GatewayResult<()> {
        let (url, name) = self.target.clone().ok_or(GatewayError::NoActiveSession)?;
        self.stop_polling();

        let window = self.host.open(&url, &name).ok_or(GatewayError::PopupBlocked)?;
        self.generation += 1;
        let weak = Arc::downgrade(&window);
        self.window = Some(weak.clone());

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            weak,
            self.generation,
            self.poll_interval,
            self.events_tx.clone(),
            cancel_token.clone(),
        ));
        self.poller = Some(handle);
        self.cancel_token = Some(cancel_token);

        log_info!("popup {name} opened (generation {})", self.generation);
        Ok(())
    }
}

impl Drop for PopupMonitor {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn poll_loop(
    window: Weak<dyn PopupWindow>,
    generation: u64,
    poll_interval: Duration,
    events_tx: mpsc::UnboundedSender<PopupEvent>,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A handle the host already dropped counts as closed.
                let closed = window.upgrade().map(|w| w.is_closed()).unwrap_or(true);
                if closed {
                    log_info!("popup generation {generation} closed");
                    let _ = events_tx.send(PopupEvent::Closed { generation });
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_debug!("popup poller {generation} cancelled");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::SimulatedWindowHost;
    use tokio::time::timeout;

    fn monitor(
        host: Arc<SimulatedWindowHost>,
    ) -> (PopupMonitor, mpsc::UnboundedReceiver<PopupEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PopupMonitor::new(host, Duration::from_millis(10), tx), rx)
    }

    #[tokio::test]
    async fn blocked_popup_is_reported() {
        let host = Arc::new(SimulatedWindowHost::new());
        host.set_blocking(true);
        let (mut monitor, _rx) = monitor(host.clone());

        let err = monitor.open("https://ad.example", "k1").unwrap_err();
        assert!(matches!(err, GatewayError::PopupBlocked));
        assert!(!monitor.is_open());

        host.set_blocking(false);
        monitor.reopen().unwrap();
        assert!(monitor.is_open());
        assert_eq!(host.latest().unwrap().name, "visit-k1");
    }

    #[tokio::test]
    async fn closing_emits_exactly_one_event() {
        let host = Arc::new(SimulatedWindowHost::new());
        let (mut monitor, mut rx) = monitor(host.clone());
        monitor.open("https://ad.example", "k2").unwrap();

        host.latest().unwrap().close_by_user();
        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(event, Some(PopupEvent::Closed { generation: 1 }));

        // Poller has exited; nothing further arrives.
        let next = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn stale_handle_counts_as_closed() {
        let host = Arc::new(SimulatedWindowHost::new());
        let (mut monitor, mut rx) = monitor(host.clone());
        monitor.open("https://ad.example", "k3").unwrap();

        host.close_all();
        host.forget_closed();
        assert!(!monitor.is_open());
        assert!(!monitor.focus());

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(PopupEvent::Closed { .. })));

        monitor.reopen().unwrap();
        assert_eq!(monitor.generation(), 2);
        assert_eq!(host.opened_count(), 2);
    }

    #[tokio::test]
    async fn reopen_focuses_live_window() {
        let host = Arc::new(SimulatedWindowHost::new());
        let (mut monitor, _rx) = monitor(host.clone());
        monitor.open("https://ad.example", "k4").unwrap();

        monitor.reopen().unwrap();
        assert_eq!(host.opened_count(), 1);
        assert_eq!(host.latest().unwrap().focus_count(), 1);
    }

    #[tokio::test]
    async fn close_stops_polling_without_event() {
        let host = Arc::new(SimulatedWindowHost::new());
        let (mut monitor, mut rx) = monitor(host.clone());
        monitor.open("https://ad.example", "k5").unwrap();

        monitor.close();
        assert!(host.latest().unwrap().is_closed());
        let next = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(next.is_err());
    }
}
