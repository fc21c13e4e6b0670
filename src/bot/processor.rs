use std::sync::Arc;

use super::dispatcher::BotError;
use super::ledger::{Ledger, LedgerError};

/* Economy is the logic center for the point economy.
 * It sits between the front-facing command handlers and the back-facing
 * ledger collaborator: affordability, transfers and administrative grants
 * are decided here, storage stays behind the Ledger trait.
 */

pub struct Economy {
    ledger: Arc<dyn Ledger>,
}

impl Economy {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Economy { ledger }
    }

    // Read with a default: an unreachable ledger reads as 0, never as an error.
    pub async fn balance_of(&self, user: &str) -> f64 {
        match self.ledger.balance(user).await {
            Ok(balance) => balance,
            Err(err) => {
                log::error!("could not read balance for {user}: {err}");
                0.0
            }
        }
    }

    /* Applies delta if the user can afford it. One atomic round trip against
     * the ledger; on failure the stored balance is untouched.
     */
    pub async fn check_cost_add_if_enough(&self, user: &str, delta: f64) -> Result<f64, BotError> {
        match self.ledger.adjust(user, delta).await {
            Ok(updated) => Ok(updated),
            Err(LedgerError::Insufficient) => Err(BotError::UserError(format!(
                "{user} can't afford that!"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /* Moves amount from one user to another. The sender must afford it; the
     * recipient is credited with no guard of their own.
     */
    pub async fn transfer(&self, from: &str, to: &str, amount: f64) -> Result<(), BotError> {
        if !(amount > 0.0) {
            return Err(BotError::UserError(
                "Transfer amounts must be positive.".to_string(),
            ));
        }

        self.check_cost_add_if_enough(from, -amount).await?;
        if let Err(err) = self.ledger.credit(to, amount).await {
            // The debit went through; losing the credit is a ledger outage,
            // not a user mistake.
            log::error!("transfer credit to {to} failed: {err}");
            return Err(err.into());
        }
        Ok(())
    }

    // Broadcaster-only override. Bypasses affordability; any value goes.
    pub async fn grant(&self, target: &str, amount: f64) -> Result<(), BotError> {
        self.ledger.set_balance(target, amount).await?;
        Ok(())
    }

    // Credit that tolerates nothing: used for market payouts.
    pub async fn payout(&self, user: &str, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        if let Err(err) = self.ledger.credit(user, amount).await {
            log::error!("could not pay out {amount} to {user}: {err}");
        }
    }
}
