mod api;
mod attention;
mod claim;
mod db;
mod error;
mod heartbeat;
mod models;
mod popup;
mod quiz;
mod settings;
mod state;
mod timer;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

pub use api::ApiClient;
pub use attention::{AttentionEvent, AttentionSignal};
pub use claim::{ClaimGate, ClaimPermit};
pub use db::VisitCache;
pub use error::{GatewayError, GatewayResult};
pub use models::{
    CampaignSnapshot, ClaimRequest, ClaimResult, HeartbeatPayload, Quiz, QuizQuestion, QuizResult,
    QuizSubmission, RewardTier, StartVisit, VisitRecord, VisitStatus, WalletBalance,
};
pub use popup::{PopupMonitor, PopupWindow, SimulatedWindow, SimulatedWindowHost, WindowHost};
pub use settings::Settings;
pub use state::Wallet;
pub use timer::{
    EngagementTimer, GatewayEvent, PauseReasons, TickOutcome, TimerPhase, VisitController,
    VisitSnapshot,
};

use timer::commands::{self, Command};

/// Everything the console session shares; passed explicitly instead of
/// living in globals.
pub struct AppState {
    pub settings: Settings,
    pub api: ApiClient,
    pub wallet: Wallet,
    pub cache: VisitCache,
    pub host: Arc<SimulatedWindowHost>,
    pub controller: VisitController,
}

impl AppState {
    pub async fn new(settings: Settings, cache: VisitCache) -> Result<Self> {
        let api = ApiClient::new(
            &settings.api_base_url,
            settings.auth_token.clone(),
            settings.request_timeout(),
        )
        .context("invalid API configuration")?;

        let wallet = Wallet::new(cache.last_balance().await.unwrap_or_else(|err| {
            warn!("Ignoring cached balance: {err:?}");
            None
        }));
        let host = Arc::new(SimulatedWindowHost::new());
        let controller = VisitController::new(
            api.clone(),
            host.clone(),
            wallet.clone(),
            cache.clone(),
            &settings,
        );

        Ok(Self {
            settings,
            api,
            wallet,
            cache,
            host,
            controller,
        })
    }

    /// Pulls the authoritative balance; failures keep the cached value.
    pub async fn sync_wallet(&self) {
        match self.api.wallet().await {
            Ok(wallet) => {
                self.wallet.sync_from_server(wallet.balance);
                self.cache.remember_balance(wallet.balance).await;
            }
            Err(err) => warn!("Could not load wallet balance: {}", err.user_message()),
        }
    }

    /// Tears down the active visit and flushes the local cache.
    pub async fn shutdown(&self) -> Result<()> {
        self.controller.shutdown().await;
        self.cache.shutdown().await
    }
}

pub fn run() -> Result<()> {
    let data_dir = settings::data_dir();
    let (settings, load_warning) = Settings::load(&data_dir)?;
    utils::init_logging(settings.debug);
    if let Some(message) = load_warning {
        warn!("{message}");
    }

    info!("visitgate starting (api {})", settings.api_base_url);

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let cache = VisitCache::open(data_dir.join("visitgate.sqlite3"))?;
        cache.start_flusher(settings.cache_flush_interval()).await;

        let app = AppState::new(settings, cache).await?;
        app.sync_wallet().await;

        let printer = spawn_event_printer(&app.controller);
        let result = console_loop(&app).await;

        app.shutdown().await?;
        printer.abort();
        result
    })
}

async fn console_loop(app: &AppState) -> Result<()> {
    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        let quit = command == Command::Quit;

        match commands::execute(app, command).await {
            Ok(output) if !output.is_empty() => println!("{output}"),
            Ok(_) => {}
            Err(message) => println!("error: {message}"),
        }
        if quit {
            break;
        }
    }
    Ok(())
}

fn spawn_event_printer(controller: &VisitController) -> tokio::task::JoinHandle<()> {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        let mut last_phase = None;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            match event {
                GatewayEvent::StateChanged(snapshot) => {
                    if last_phase != Some(snapshot.phase) {
                        println!(
                            "[{:?}] {}s remaining",
                            snapshot.phase, snapshot.remaining_secs
                        );
                        last_phase = Some(snapshot.phase);
                    }
                }
                GatewayEvent::PopupBlocked { .. } => {
                    println!("[popup blocked] allow popups, then run 'reopen'")
                }
                GatewayEvent::PopupClosed { .. } => {
                    println!("[popup closed] timer paused, run 'reopen' to continue")
                }
                GatewayEvent::Completed(_) => println!("[complete] reward unlocked, run 'claim'"),
                GatewayEvent::ClaimFailed { message, .. } => {
                    println!("[claim failed] {message}; you can retry")
                }
                GatewayEvent::Claimed { .. }
                | GatewayEvent::QuizGraded { .. }
                | GatewayEvent::Cancelled { .. }
                | GatewayEvent::Abandoned { .. } => last_phase = None,
            }
        }
    })
}
