//! Write-behind cache for local visit history.
//!
//! Writes land in memory and are coalesced per key; a background task
//! flushes them to SQLite on a fixed interval, and `shutdown` flushes
//! whatever is left. Nothing here is a source of truth for balances.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::connection::Database;
use crate::models::VisitRecord;

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_error, log_info};

const LAST_BALANCE_KEY: &str = "last_balance";

#[derive(Default)]
struct Pending {
    visits: HashMap<String, VisitRecord>,
    state: HashMap<String, String>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.visits.is_empty() && self.state.is_empty()
    }
}

#[derive(Clone)]
pub struct VisitCache {
    db: Database,
    pending: Arc<Mutex<Pending>>,
    flusher: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel_token: CancellationToken,
}

impl VisitCache {
    pub fn open(path: PathBuf) -> Result<Self> {
        let db = Database::new(path)?;
        log_debug!("visit cache opened at {}", db.path().display());
        Ok(Self {
            db,
            pending: Arc::new(Mutex::new(Pending::default())),
            flusher: Arc::new(Mutex::new(None)),
            cancel_token: CancellationToken::new(),
        })
    }

    pub async fn start_flusher(&self, interval: Duration) {
        let mut guard = self.flusher.lock().await;
        if guard.is_some() {
            return;
        }

        let cache = self.clone();
        let token = self.cancel_token.clone();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = cache.flush().await {
                            log_error!("visit cache flush failed: {err:?}");
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        }));
    }

    /// Queues a visit write; a later write for the same visit replaces it.
    pub async fn record_visit(&self, record: VisitRecord) {
        self.pending
            .lock()
            .await
            .visits
            .insert(record.id.clone(), record);
    }

    /// Remembers the last server-reported balance for offline display.
    pub async fn remember_balance(&self, balance: u64) {
        self.pending
            .lock()
            .await
            .state
            .insert(LAST_BALANCE_KEY.to_string(), balance.to_string());
    }

    pub async fn pending_len(&self) -> usize {
        let pending = self.pending.lock().await;
        pending.visits.len() + pending.state.len()
    }

    /// Writes everything queued so far. Returns the number of entries
    /// written. On failure the entries are queued again unless a newer
    /// write for the same key arrived meanwhile.
    pub async fn flush(&self) -> Result<usize> {
        let batch = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                return Ok(0);
            }
            std::mem::take(&mut *pending)
        };

        let count = batch.visits.len() + batch.state.len();
        let visits: Vec<VisitRecord> = batch.visits.values().cloned().collect();
        let state: Vec<(String, String)> = batch
            .state
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        match self.db.write_batch(visits, state).await {
            Ok(()) => {
                log_debug!("flushed {count} cached entries");
                Ok(count)
            }
            Err(err) => {
                let mut pending = self.pending.lock().await;
                for (id, record) in batch.visits {
                    pending.visits.entry(id).or_insert(record);
                }
                for (key, value) in batch.state {
                    pending.state.entry(key).or_insert(value);
                }
                Err(err)
            }
        }
    }

    pub async fn recent_visits(&self, limit: usize) -> Result<Vec<VisitRecord>> {
        self.flush().await?;
        self.db.recent_visits(limit).await
    }

    pub async fn last_balance(&self) -> Result<Option<u64>> {
        if let Some(value) = self.pending.lock().await.state.get(LAST_BALANCE_KEY) {
            return value.parse().map(Some).context("corrupt cached balance");
        }
        match self.db.get_state(LAST_BALANCE_KEY).await? {
            Some(value) => value.parse().map(Some).context("corrupt cached balance"),
            None => Ok(None),
        }
    }

    /// Stops the flusher and writes anything still pending.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.flusher.lock().await.take() {
            handle.await.context("visit cache flusher failed to join")?;
        }
        let written = self.flush().await?;
        log_info!("visit cache closed ({written} entries flushed on teardown)");
        Ok(())
    }
}
