use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

/* Ledger seam.
 * The point balances live in an external store. The core talks to it through
 * this trait only, and never composes a read with a later write: adjust is a
 * single atomic round trip, which is what rules out the lost-update race two
 * concurrent affordability checks would otherwise have.
 */

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LedgerError {
    // The adjustment would take the balance below zero; nothing was written.
    #[error("insufficient balance")]
    Insufficient,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    // Balance for a user, 0 when the user has never been written.
    async fn balance(&self, user: &str) -> Result<f64, LedgerError>;

    /* Atomically applies delta if the resulting balance stays >= 0 and
     * returns the new balance; fails with Insufficient otherwise, leaving
     * the stored balance untouched.
     */
    async fn adjust(&self, user: &str, delta: f64) -> Result<f64, LedgerError>;

    // Unconditional write. Administrative overrides only; no affordability check.
    async fn set_balance(&self, user: &str, value: f64) -> Result<(), LedgerError>;

    // Credit with no lower-bound concern. Default goes through adjust.
    async fn credit(&self, user: &str, amount: f64) -> Result<f64, LedgerError> {
        self.adjust(user, amount).await
    }
}

// In-memory backend for tests and single-process hosts.
#[derive(Default)]
pub struct MemoryLedger {
    balances: Mutex<HashMap<String, f64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(user: &str, balance: f64) -> Self {
        let ledger = Self::new();
        ledger
            .balances
            .lock()
            .unwrap()
            .insert(user.to_lowercase(), balance);
        ledger
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn balance(&self, user: &str) -> Result<f64, LedgerError> {
        let balances = self.balances.lock().unwrap();
        Ok(balances.get(&user.to_lowercase()).copied().unwrap_or(0.0))
    }

    async fn adjust(&self, user: &str, delta: f64) -> Result<f64, LedgerError> {
        let mut balances = self.balances.lock().unwrap();
        let entry = balances.entry(user.to_lowercase()).or_insert(0.0);
        let updated = *entry + delta;
        if updated < 0.0 {
            return Err(LedgerError::Insufficient);
        }
        *entry = updated;
        Ok(updated)
    }

    async fn set_balance(&self, user: &str, value: f64) -> Result<(), LedgerError> {
        let mut balances = self.balances.lock().unwrap();
        balances.insert(user.to_lowercase(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Ledger, LedgerError, MemoryLedger};

    #[tokio::test]
    async fn test_unknown_user_has_zero_balance() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.balance("alice").await, Ok(0.0));
    }

    #[tokio::test]
    async fn test_adjust_is_rejected_below_zero() {
        let ledger = MemoryLedger::with_balance("alice", 30.0);
        assert_eq!(
            ledger.adjust("alice", -50.0).await,
            Err(LedgerError::Insufficient)
        );
        // Nothing written on failure.
        assert_eq!(ledger.balance("alice").await, Ok(30.0));

        assert_eq!(ledger.adjust("alice", -30.0).await, Ok(0.0));
    }

    #[tokio::test]
    async fn test_usernames_are_case_insensitive() {
        let ledger = MemoryLedger::new();
        ledger.adjust("Alice", 10.0).await.unwrap();
        assert_eq!(ledger.balance("alice").await, Ok(10.0));
    }

    #[tokio::test]
    async fn test_set_balance_allows_negative() {
        let ledger = MemoryLedger::new();
        ledger.set_balance("alice", -500.0).await.unwrap();
        assert_eq!(ledger.balance("alice").await, Ok(-500.0));
    }
}
