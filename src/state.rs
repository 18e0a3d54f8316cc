//! Shared application state handed to every component that needs it.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{ClaimResult, QuizResult};

const ENABLE_LOGS: bool = true;
use crate::log_info;

/// The user's coin balance as last reported by the server.
///
/// Only server responses may change it: a claim result, a graded quiz, or
/// an explicit wallet sync. The client never adds or subtracts locally.
#[derive(Clone)]
pub struct Wallet {
    balance: Arc<watch::Sender<Option<u64>>>,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Wallet {
    pub fn new(initial: Option<u64>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            balance: Arc::new(tx),
        }
    }

    pub fn balance(&self) -> Option<u64> {
        *self.balance.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.balance.subscribe()
    }

    pub fn apply_claim(&self, result: &ClaimResult) {
        log_info!(
            "claim credited {} coins, balance now {}",
            result.coins_earned,
            result.new_balance
        );
        self.balance.send_replace(Some(result.new_balance));
    }

    pub fn apply_quiz(&self, result: &QuizResult) {
        log_info!(
            "quiz {}/{} credited {} coins, balance now {}",
            result.correct,
            result.total,
            result.coins_earned,
            result.new_balance
        );
        self.balance.send_replace(Some(result.new_balance));
    }

    pub fn sync_from_server(&self, balance: u64) {
        self.balance.send_replace(Some(balance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_result_replaces_balance() {
        let wallet = Wallet::new(Some(10));
        let mut rx = wallet.subscribe();

        wallet.apply_claim(&ClaimResult {
            coins_earned: 5,
            new_balance: 42,
        });

        assert_eq!(wallet.balance(), Some(42));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(42));
    }

    #[test]
    fn server_sync_is_authoritative() {
        let wallet = Wallet::default();
        assert_eq!(wallet.balance(), None);
        wallet.sync_from_server(7);
        wallet.apply_quiz(&QuizResult {
            correct: 1,
            total: 2,
            coins_earned: 3,
            new_balance: 4,
        });
        assert_eq!(wallet.balance(), Some(4));
    }
}
