//! Best-effort telemetry for an active visit.
//!
//! Failures are logged and dropped; the next beat fires on schedule and
//! neither the timer nor the claim ever wait on a heartbeat.

use std::time::Duration;

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::ApiClient,
    models::HeartbeatPayload,
    timer::{TimerPhase, VisitSnapshot},
};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_warn};

pub struct HeartbeatReporter {
    api: ApiClient,
    token: String,
    interval: Duration,
}

impl HeartbeatReporter {
    pub fn new(api: ApiClient, token: String, interval: Duration) -> Self {
        Self {
            api,
            token,
            interval,
        }
    }

    pub fn payload(&self, snapshot: &VisitSnapshot) -> HeartbeatPayload {
        HeartbeatPayload {
            token: self.token.clone(),
            active_time: snapshot.credited_secs,
            mouse_movements: snapshot.mouse_movements,
            verification_passed: snapshot.phase == TimerPhase::Complete,
        }
    }

    /// Runs until the visit completes or `cancel_token` fires.
    pub fn spawn(
        self,
        snapshots: watch::Receiver<VisitSnapshot>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = snapshots.borrow().clone();
                        if snapshot.phase == TimerPhase::Complete {
                            log_debug!("visit {} complete; heartbeats stopped", snapshot.visit_id);
                            break;
                        }

                        let payload = self.payload(&snapshot);
                        let api = self.api.clone();
                        // Sent detached so a slow request never delays the next beat.
                        tokio::spawn(async move {
                            match api.heartbeat(&payload).await {
                                Ok(()) => log_debug!("heartbeat sent (active {}s)", payload.active_time),
                                Err(err) => log_warn!("heartbeat failed, will retry next cycle: {err}"),
                            }
                        });
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::test_server, timer::PauseReasons};
    use std::sync::atomic::Ordering;

    fn snapshot(phase: TimerPhase, credited_secs: u64) -> VisitSnapshot {
        VisitSnapshot {
            visit_id: "v1".into(),
            campaign_id: "c-1".into(),
            campaign_url: "https://ad.example".into(),
            phase,
            elapsed_secs: credited_secs,
            credited_secs,
            required_secs: 30,
            remaining_secs: 30 - credited_secs,
            progress_percent: 0,
            pause_reasons: PauseReasons::default(),
            popup_open: true,
            attending: true,
            mouse_movements: 4,
        }
    }

    async fn wait_for(predicate: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if predicate() {
                return true;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn payload_reflects_snapshot() {
        let api = ApiClient::new("http://localhost/", None, Duration::from_secs(1)).unwrap();
        let reporter = HeartbeatReporter::new(api, "tok".into(), Duration::from_secs(10));
        let payload = reporter.payload(&snapshot(TimerPhase::Running, 12));
        assert_eq!(payload.token, "tok");
        assert_eq!(payload.active_time, 12);
        assert_eq!(payload.mouse_movements, 4);
        assert!(!payload.verification_passed);
    }

    #[tokio::test]
    async fn keeps_beating_after_server_errors() {
        let server = test_server::spawn(30, 0).await;
        server.backend.failing_heartbeats.store(2, Ordering::SeqCst);
        let api = ApiClient::new(&server.base_url, None, Duration::from_secs(2)).unwrap();

        let (_tx, rx) = watch::channel(snapshot(TimerPhase::Running, 3));
        let token = CancellationToken::new();
        let handle = HeartbeatReporter::new(api, "tok".into(), Duration::from_millis(20))
            .spawn(rx, token.clone());

        let backend = server.backend.clone();
        assert!(wait_for(|| backend.heartbeats.load(Ordering::SeqCst) >= 4).await);

        token.cancel();
        handle.await.unwrap();
        let body = server.backend.last_heartbeat.lock().unwrap().clone().unwrap();
        assert_eq!(body["activeTime"], 3);
    }

    #[tokio::test]
    async fn stops_once_visit_completes() {
        let server = test_server::spawn(30, 0).await;
        let api = ApiClient::new(&server.base_url, None, Duration::from_secs(2)).unwrap();

        let (tx, rx) = watch::channel(snapshot(TimerPhase::Running, 29));
        let handle = HeartbeatReporter::new(api, "tok".into(), Duration::from_millis(20))
            .spawn(rx, CancellationToken::new());

        tx.send_replace(snapshot(TimerPhase::Complete, 30));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter should exit after completion")
            .unwrap();
    }
}
