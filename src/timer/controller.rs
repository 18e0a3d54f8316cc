use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    api::ApiClient,
    attention::{AttentionEvent, AttentionSignal},
    claim::{self, ClaimGate},
    db::VisitCache,
    error::{GatewayError, GatewayResult},
    heartbeat::HeartbeatReporter,
    models::{CampaignSnapshot, ClaimResult, Quiz, QuizResult, VisitRecord, VisitStatus},
    popup::{PopupEvent, PopupMonitor, WindowHost},
    quiz,
    settings::Settings,
    state::Wallet,
};

use super::{EngagementTimer, PauseReasons, TickOutcome, TimerPhase};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

/// Everything the UI needs to render the visit page.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitSnapshot {
    pub visit_id: String,
    pub campaign_id: String,
    pub campaign_url: String,
    pub phase: TimerPhase,
    /// Raw counted seconds, display only.
    pub elapsed_secs: u64,
    /// Seconds clamped to the requirement, used for gating and reporting.
    pub credited_secs: u64,
    pub required_secs: u64,
    pub remaining_secs: u64,
    pub progress_percent: u8,
    pub pause_reasons: PauseReasons,
    pub popup_open: bool,
    pub attending: bool,
    pub mouse_movements: u64,
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    StateChanged(VisitSnapshot),
    PopupBlocked { visit_id: String },
    PopupClosed { visit_id: String },
    Completed(VisitSnapshot),
    Claimed { visit_id: String, result: ClaimResult },
    QuizGraded { visit_id: String, result: QuizResult },
    ClaimFailed { visit_id: String, message: String },
    Cancelled { visit_id: String },
    Abandoned { visit_id: String },
}

enum DriverCommand {
    Attention(AttentionEvent),
    ReopenPopup(oneshot::Sender<GatewayResult<()>>),
    FocusPopup(oneshot::Sender<bool>),
}

struct ActiveVisit {
    id: String,
    token: String,
    campaign: CampaignSnapshot,
    started_at: DateTime<Utc>,
    commands: mpsc::UnboundedSender<DriverCommand>,
    snapshots: watch::Receiver<VisitSnapshot>,
    gate: ClaimGate,
    quiz: Option<Quiz>,
    cancel_token: CancellationToken,
    driver: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl ActiveVisit {
    fn snapshot(&self) -> VisitSnapshot {
        self.snapshots.borrow().clone()
    }
}

impl Drop for ActiveVisit {
    fn drop(&mut self) {
        // Navigation away without an explicit teardown still stops every task.
        self.cancel_token.cancel();
    }
}

/// Owns the single active visit and every background task tied to it.
#[derive(Clone)]
pub struct VisitController {
    api: ApiClient,
    host: Arc<dyn WindowHost>,
    wallet: Wallet,
    cache: VisitCache,
    tick_interval: Duration,
    heartbeat_interval: Duration,
    popup_poll_interval: Duration,
    active: Arc<Mutex<Option<ActiveVisit>>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl VisitController {
    pub fn new(
        api: ApiClient,
        host: Arc<dyn WindowHost>,
        wallet: Wallet,
        cache: VisitCache,
        settings: &Settings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            host,
            wallet,
            cache,
            tick_interval: settings.tick_interval(),
            heartbeat_interval: settings.heartbeat_interval(),
            popup_poll_interval: settings.popup_poll_interval(),
            active: Arc::new(Mutex::new(None)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Option<VisitSnapshot> {
        self.active.lock().await.as_ref().map(ActiveVisit::snapshot)
    }

    /// Whether the claim control should currently be enabled.
    pub async fn can_claim(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|visit| visit.gate.can_claim(&visit.snapshot()))
            .unwrap_or(false)
    }

    /// Starts a visit and opens the campaign popup.
    ///
    /// A blocked popup still leaves the visit in place, idle, and returns
    /// `PopupBlocked`; `reopen_popup` retries once the user allows popups.
    pub async fn start_visit(&self, campaign_id: &str) -> GatewayResult<VisitSnapshot> {
        if self.active.lock().await.is_some() {
            return Err(GatewayError::SessionActive);
        }

        // Lock is released while the request is pending.
        let started = self.api.start_visit(campaign_id).await?;

        let mut active = self.active.lock().await;
        if active.is_some() {
            log_warn!("visit for campaign {campaign_id} started elsewhere meanwhile; dropping token");
            return Err(GatewayError::SessionActive);
        }

        let visit_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let campaign = started.campaign;

        let (popup_tx, popup_rx) = mpsc::unbounded_channel();
        let mut popup = PopupMonitor::new(self.host.clone(), self.popup_poll_interval, popup_tx);
        let popup_result = popup.open(&campaign.url, &visit_id);

        let (snapshot_tx, snapshot_rx) = watch::channel(placeholder_snapshot(&visit_id, &campaign));
        let mut driver = VisitDriver {
            visit_id: visit_id.clone(),
            campaign: campaign.clone(),
            timer: EngagementTimer::new(campaign.watch_duration_seconds),
            attention: AttentionSignal::new(),
            popup,
            snapshots: snapshot_tx,
            events: self.events.clone(),
        };
        driver.reevaluate();
        driver.publish();
        let initial = driver.snapshot();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let driver_handle = tokio::spawn(driver.run(
            commands_rx,
            popup_rx,
            self.tick_interval,
            cancel_token.child_token(),
        ));
        let heartbeat_handle =
            HeartbeatReporter::new(self.api.clone(), started.token.clone(), self.heartbeat_interval)
                .spawn(snapshot_rx.clone(), cancel_token.child_token());

        log_info!(
            "visit {visit_id} started for campaign {} ({}s required)",
            campaign.id,
            campaign.watch_duration_seconds
        );

        self.cache
            .record_visit(visit_record(
                &visit_id,
                &campaign,
                started_at,
                &initial,
                VisitStatus::Active,
                None,
            ))
            .await;

        *active = Some(ActiveVisit {
            id: visit_id.clone(),
            token: started.token,
            campaign,
            started_at,
            commands: commands_tx,
            snapshots: snapshot_rx,
            gate: ClaimGate::new(),
            quiz: None,
            cancel_token,
            driver: Some(driver_handle),
            heartbeat: Some(heartbeat_handle),
        });

        match popup_result {
            Ok(()) => Ok(initial),
            Err(err) => {
                log_warn!("popup for visit {visit_id} blocked");
                let _ = self.events.send(GatewayEvent::PopupBlocked { visit_id });
                Err(err)
            }
        }
    }

    pub async fn handle_attention(&self, event: AttentionEvent) -> GatewayResult<()> {
        let commands = self.commands().await?;
        commands
            .send(DriverCommand::Attention(event))
            .map_err(|_| GatewayError::NoActiveSession)
    }

    /// Re-acquires a blocked or closed popup, or focuses a live one.
    pub async fn reopen_popup(&self) -> GatewayResult<()> {
        let commands = self.commands().await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(DriverCommand::ReopenPopup(reply_tx))
            .map_err(|_| GatewayError::NoActiveSession)?;
        reply_rx.await.map_err(|_| GatewayError::NoActiveSession)?
    }

    pub async fn focus_popup(&self) -> GatewayResult<bool> {
        let commands = self.commands().await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(DriverCommand::FocusPopup(reply_tx))
            .map_err(|_| GatewayError::NoActiveSession)?;
        reply_rx.await.map_err(|_| GatewayError::NoActiveSession)
    }

    pub async fn claim_reward(&self) -> GatewayResult<ClaimResult> {
        let (visit_id, token, gate, snapshot) = {
            let active = self.active.lock().await;
            let visit = active.as_ref().ok_or(GatewayError::NoActiveSession)?;
            (
                visit.id.clone(),
                visit.token.clone(),
                visit.gate.clone(),
                visit.snapshot(),
            )
        };

        // The permit stays held until the visit is torn down, so cancel
        // and shutdown cannot interleave with a payout.
        let permit = gate.begin(&snapshot)?;
        match claim::submit_claim(&self.api, &permit, &token, &snapshot).await {
            Ok(result) => {
                self.wallet.apply_claim(&result);
                self.cache.remember_balance(result.new_balance).await;
                self.finish(&visit_id, VisitStatus::Claimed, Some(result.coins_earned))
                    .await;
                drop(permit);
                let _ = self.events.send(GatewayEvent::Claimed { visit_id, result });
                Ok(result)
            }
            Err(err) => {
                drop(permit);
                self.report_failure(&visit_id, &err);
                Err(err)
            }
        }
    }

    pub async fn fetch_quiz(&self) -> GatewayResult<Quiz> {
        let (visit_id, snapshot) = {
            let active = self.active.lock().await;
            let visit = active.as_ref().ok_or(GatewayError::NoActiveSession)?;
            (visit.id.clone(), visit.snapshot())
        };

        let fetched = quiz::fetch_quiz(&self.api, &snapshot).await?;

        let mut active = self.active.lock().await;
        match active.as_mut() {
            Some(visit) if visit.id == visit_id => {
                visit.quiz = Some(fetched.clone());
                Ok(fetched)
            }
            _ => Err(GatewayError::NoActiveSession),
        }
    }

    pub async fn submit_quiz(&self, answers: Vec<usize>) -> GatewayResult<QuizResult> {
        let (visit_id, token, gate, snapshot, fetched) = {
            let active = self.active.lock().await;
            let visit = active.as_ref().ok_or(GatewayError::NoActiveSession)?;
            let fetched = visit.quiz.clone().ok_or_else(|| {
                GatewayError::InvalidAnswers("load the quiz before answering".into())
            })?;
            (
                visit.id.clone(),
                visit.token.clone(),
                visit.gate.clone(),
                visit.snapshot(),
                fetched,
            )
        };

        quiz::validate_answers(&fetched, &answers)?;
        let permit = gate.begin(&snapshot)?;
        match quiz::send_answers(&self.api, &permit, &token, &snapshot, &fetched, answers).await {
            Ok(result) => {
                self.wallet.apply_quiz(&result);
                self.cache.remember_balance(result.new_balance).await;
                self.finish(&visit_id, VisitStatus::Claimed, Some(result.coins_earned))
                    .await;
                drop(permit);
                let _ = self.events.send(GatewayEvent::QuizGraded { visit_id, result });
                Ok(result)
            }
            Err(err) => {
                drop(permit);
                self.report_failure(&visit_id, &err);
                Err(err)
            }
        }
    }

    /// Discards the visit without claiming. No partial credit.
    ///
    /// Refused with `ClaimInFlight` while a claim or quiz submission is
    /// outstanding.
    pub async fn cancel_visit(&self) -> GatewayResult<()> {
        let visit = {
            let mut active = self.active.lock().await;
            let closed = match active.as_ref() {
                Some(visit) => visit.gate.try_close(),
                None => return Ok(()),
            };
            if !closed {
                return Err(GatewayError::ClaimInFlight);
            }
            active.take()
        };

        if let Some(visit) = visit {
            let visit_id = visit.id.clone();
            self.teardown(visit, VisitStatus::Cancelled, None).await;
            log_info!("visit {visit_id} cancelled");
            let _ = self.events.send(GatewayEvent::Cancelled { visit_id });
        }
        Ok(())
    }

    /// Teardown on navigation away or application exit. An outstanding
    /// claim is allowed to finish first; if it pays out, the visit ends as
    /// claimed rather than abandoned.
    pub async fn shutdown(&self) {
        let visit = loop {
            let gate = {
                let mut active = self.active.lock().await;
                let gate = match active.as_ref() {
                    Some(visit) => visit.gate.clone(),
                    None => return,
                };
                if gate.try_close() {
                    break active.take();
                }
                gate
            };
            gate.wait_idle().await;
        };

        if let Some(visit) = visit {
            let visit_id = visit.id.clone();
            self.teardown(visit, VisitStatus::Abandoned, None).await;
            log_info!("visit {visit_id} abandoned");
            let _ = self.events.send(GatewayEvent::Abandoned { visit_id });
        }
    }

    async fn commands(&self) -> GatewayResult<mpsc::UnboundedSender<DriverCommand>> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|visit| visit.commands.clone())
            .ok_or(GatewayError::NoActiveSession)
    }

    /// Any failure once the request was admitted re-enables the claim
    /// control, so the UI always hears about it.
    fn report_failure(&self, visit_id: &str, err: &GatewayError) {
        let _ = self.events.send(GatewayEvent::ClaimFailed {
            visit_id: visit_id.to_string(),
            message: err.user_message(),
        });
    }

    /// Ends the visit if it is still the active one. Returns false when it
    /// is already gone.
    async fn finish(&self, visit_id: &str, status: VisitStatus, coins: Option<u64>) -> bool {
        let visit = {
            let mut active = self.active.lock().await;
            match active.take() {
                Some(visit) if visit.id == visit_id => visit,
                other => {
                    *active = other;
                    return false;
                }
            }
        };
        self.teardown(visit, status, coins).await;
        true
    }

    /// Stops the driver, heartbeat and popup poller, closes the popup and
    /// records the outcome locally.
    async fn teardown(&self, mut visit: ActiveVisit, status: VisitStatus, coins: Option<u64>) {
        visit.cancel_token.cancel();
        for handle in [visit.driver.take(), visit.heartbeat.take()].into_iter().flatten() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log_error!("visit {} task failed: {err}", visit.id);
                }
            }
        }

        let snapshot = visit.snapshot();
        self.cache
            .record_visit(visit_record(
                &visit.id,
                &visit.campaign,
                visit.started_at,
                &snapshot,
                status,
                coins,
            ))
            .await;
    }
}

/// Runs every state transition of one visit on a single task, so ticks,
/// attention changes and popup events are applied strictly in order.
struct VisitDriver {
    visit_id: String,
    campaign: CampaignSnapshot,
    timer: EngagementTimer,
    attention: AttentionSignal,
    popup: PopupMonitor,
    snapshots: watch::Sender<VisitSnapshot>,
    events: broadcast::Sender<GatewayEvent>,
}

impl VisitDriver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<DriverCommand>,
        mut popup_events: mpsc::UnboundedReceiver<PopupEvent>,
        tick_interval: Duration,
        cancel_token: CancellationToken,
    ) {
        let mut ticker = time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                Some(command) = commands.recv() => self.handle_command(command),
                Some(event) = popup_events.recv() => self.handle_popup_event(event),
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.popup.close();
        log_debug!("visit {} driver stopped", self.visit_id);
    }

    fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Attention(event) => {
                self.attention.apply(event);
                if self.reevaluate() || event == AttentionEvent::PointerMoved {
                    self.publish();
                }
            }
            DriverCommand::ReopenPopup(reply) => {
                let result = self.popup.reopen();
                if matches!(result, Err(GatewayError::PopupBlocked)) {
                    let _ = self.events.send(GatewayEvent::PopupBlocked {
                        visit_id: self.visit_id.clone(),
                    });
                }
                self.reevaluate();
                self.publish();
                let _ = reply.send(result);
            }
            DriverCommand::FocusPopup(reply) => {
                let _ = reply.send(self.popup.focus());
            }
        }
    }

    fn handle_popup_event(&mut self, event: PopupEvent) {
        let PopupEvent::Closed { generation } = event;
        if generation != self.popup.generation() {
            return;
        }
        let _ = self.events.send(GatewayEvent::PopupClosed {
            visit_id: self.visit_id.clone(),
        });
        self.reevaluate();
        self.publish();
    }

    fn on_tick(&mut self) {
        // Popup state is re-read on every tick so a closed window is never
        // counted, even before the poller reports it.
        self.reevaluate();
        match self.timer.tick() {
            TickOutcome::Ignored => {}
            TickOutcome::Counted { elapsed_secs } => {
                log_debug!("visit {} at {elapsed_secs}s", self.visit_id);
                self.publish();
            }
            TickOutcome::Completed => {
                log_info!(
                    "visit {} reached {}s; reward unlocked",
                    self.visit_id,
                    self.timer.required_secs()
                );
                self.publish();
                let _ = self.events.send(GatewayEvent::Completed(self.snapshot()));
            }
        }
    }

    /// Returns true when the timer phase changed.
    fn reevaluate(&mut self) -> bool {
        self.attention.set_popup_open(self.popup.is_open());
        match self
            .timer
            .apply_signals(self.attention.attending(), self.attention.popup_open())
        {
            Some(phase) => {
                log_info!("visit {} is now {phase:?}", self.visit_id);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> VisitSnapshot {
        let required = self.timer.required_secs();
        let credited = self.timer.credited_secs();
        let progress_percent = if required == 0 {
            100
        } else {
            (credited.saturating_mul(100) / required).min(100) as u8
        };

        VisitSnapshot {
            visit_id: self.visit_id.clone(),
            campaign_id: self.campaign.id.clone(),
            campaign_url: self.campaign.url.clone(),
            phase: self.timer.phase(),
            elapsed_secs: self.timer.elapsed_secs(),
            credited_secs: credited,
            required_secs: required,
            remaining_secs: self.timer.remaining_secs(),
            progress_percent,
            pause_reasons: self.timer.pause_reasons(),
            popup_open: self.attention.popup_open(),
            attending: self.attention.attending(),
            mouse_movements: self.attention.pointer_moves(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        let _ = self.events.send(GatewayEvent::StateChanged(snapshot));
    }
}

fn placeholder_snapshot(visit_id: &str, campaign: &CampaignSnapshot) -> VisitSnapshot {
    VisitSnapshot {
        visit_id: visit_id.to_string(),
        campaign_id: campaign.id.clone(),
        campaign_url: campaign.url.clone(),
        phase: TimerPhase::Idle,
        elapsed_secs: 0,
        credited_secs: 0,
        required_secs: campaign.watch_duration_seconds,
        remaining_secs: campaign.watch_duration_seconds,
        progress_percent: 0,
        pause_reasons: PauseReasons::default(),
        popup_open: false,
        attending: false,
        mouse_movements: 0,
    }
}

fn visit_record(
    visit_id: &str,
    campaign: &CampaignSnapshot,
    started_at: DateTime<Utc>,
    snapshot: &VisitSnapshot,
    status: VisitStatus,
    coins_earned: Option<u64>,
) -> VisitRecord {
    VisitRecord {
        id: visit_id.to_string(),
        campaign_id: campaign.id.clone(),
        status,
        required_secs: snapshot.required_secs,
        elapsed_secs: snapshot.elapsed_secs,
        coins_earned,
        started_at,
        updated_at: Utc::now(),
    }
}
