//! One-shot finalisation of a completed visit.
//!
//! A visit can be finalised once, by claim or by quiz submission. While a
//! request is outstanding the gate refuses a second one; if the request
//! fails the gate reopens so the user can retry. Deduplicating retries on
//! the server side is the backend's job.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Notify;

use crate::{
    api::ApiClient,
    error::{GatewayError, GatewayResult},
    models::{ClaimRequest, ClaimResult},
    timer::{TimerPhase, VisitSnapshot},
};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

#[derive(Clone, Default)]
pub struct ClaimGate {
    in_flight: Arc<AtomicBool>,
    settled: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

/// Held for the duration of a finalising request; dropping it re-enables
/// the claim control on every exit path.
pub struct ClaimPermit {
    in_flight: Arc<AtomicBool>,
    settled: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl ClaimPermit {
    /// Marks the visit as paid out. The gate never opens again.
    pub fn settle(&self) {
        self.settled.store(true, Ordering::SeqCst);
    }
}

impl Drop for ClaimPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

impl ClaimGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Whether a claim button bound to this gate should be enabled.
    pub fn can_claim(&self, snapshot: &VisitSnapshot) -> bool {
        snapshot.phase == TimerPhase::Complete && !self.is_in_flight() && !self.is_settled()
    }

    pub fn begin(&self, snapshot: &VisitSnapshot) -> GatewayResult<ClaimPermit> {
        if self.is_settled() {
            return Err(GatewayError::NoActiveSession);
        }
        if snapshot.phase != TimerPhase::Complete {
            return Err(GatewayError::ClaimNotReady);
        }
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| GatewayError::ClaimInFlight)?;
        Ok(ClaimPermit {
            in_flight: self.in_flight.clone(),
            settled: self.settled.clone(),
            idle: self.idle.clone(),
        })
    }

    /// Retires the gate for a visit ending without a payout. Refused while a
    /// request is outstanding or once a payout went through; a retired gate
    /// never admits another request.
    pub fn try_close(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.settled.swap(true, Ordering::SeqCst) {
            self.in_flight.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Resolves once no request holds the gate.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_in_flight() {
                return;
            }
            notified.await;
        }
    }
}

/// Calls the claim endpoint once with the final metrics. The caller keeps
/// the permit until it has finished acting on the outcome.
pub async fn submit_claim(
    api: &ApiClient,
    permit: &ClaimPermit,
    token: &str,
    snapshot: &VisitSnapshot,
) -> GatewayResult<ClaimResult> {
    let request = ClaimRequest {
        token: token.to_string(),
        active_time: snapshot.credited_secs,
        mouse_movements: snapshot.mouse_movements,
    };

    log_info!("claiming reward for visit {}", snapshot.visit_id);
    match api.claim(&request).await {
        Ok(result) => {
            permit.settle();
            Ok(result)
        }
        Err(err) => {
            log_warn!("claim for visit {} failed: {err}", snapshot.visit_id);
            Err(err)
        }
    }
}
