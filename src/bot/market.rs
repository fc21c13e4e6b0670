use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::constants::{BASICALLY_ZERO, MAX_HEART_RATE_SAMPLES};

/* The heart-rate stock market.
 * Viewers stake channel points against the streamer's live heart rate: a
 * position is worth stake * latest_rate / rate_at_entry. The market opens
 * implicitly on construction and closes exactly once; closing drains every
 * position and the payouts are applied to the ledger by the caller.
 */

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MarketError {
    #[error("The stock market is closed!")]
    MarketClosed,
    #[error("Amounts must be positive.")]
    InvalidAmount,
    #[error("You have no open position.")]
    NoPosition,
    #[error("You cannot withdraw more than your position is worth.")]
    InsufficientFunds,
    #[error("There is no heart rate data yet.")]
    NoHeartRate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockPosition {
    pub stake: f64,
    pub entry_heart_rate: f64,
}

// Emitted once, when the market closes.
#[derive(Debug, Clone, PartialEq)]
pub struct UserReturn {
    pub user: String,
    pub payout: f64,
}

#[derive(Debug)]
struct MarketState {
    samples: VecDeque<f64>,
    positions: HashMap<String, StockPosition>,
    closed: bool,
}

pub struct HeartStockMarket {
    capacity: usize,
    state: Mutex<MarketState>,
}

impl Default for HeartStockMarket {
    fn default() -> Self {
        Self::new(MAX_HEART_RATE_SAMPLES)
    }
}

impl HeartStockMarket {
    pub fn new(capacity: usize) -> Self {
        HeartStockMarket {
            capacity,
            state: Mutex::new(MarketState {
                samples: VecDeque::new(),
                positions: HashMap::new(),
                closed: false,
            }),
        }
    }

    // Samples keep flowing after close; only trading stops.
    pub fn push_sample(&self, heart_rate: f64) {
        let mut state = self.state.lock().unwrap();
        state.samples.push_back(heart_rate);
        while state.samples.len() > self.capacity {
            state.samples.pop_front();
        }
    }

    pub fn samples(&self) -> Vec<f64> {
        self.state.lock().unwrap().samples.iter().copied().collect()
    }

    pub fn latest_heart_rate(&self) -> Option<f64> {
        self.state.lock().unwrap().samples.back().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn position(&self, user: &str) -> Option<StockPosition> {
        self.state.lock().unwrap().positions.get(user).cloned()
    }

    pub fn invest(&self, user: &str, amount: f64) -> Result<(), MarketError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(MarketError::MarketClosed);
        }
        if !(amount > 0.0) {
            return Err(MarketError::InvalidAmount);
        }
        let latest = *state.samples.back().ok_or(MarketError::NoHeartRate)?;

        // Topping up revalues the existing stake and rebases the entry rate.
        let stake = match revalue(&mut state, user, latest) {
            Some(current) => current + amount,
            None => amount,
        };
        state.positions.insert(
            user.to_string(),
            StockPosition {
                stake,
                entry_heart_rate: latest,
            },
        );
        Ok(())
    }

    /* The current worth of a user's position. Not a pure read: the position
     * is ratcheted to the sample used for the valuation, and evicted outright
     * if the revalued stake is basically zero.
     */
    pub fn price(&self, user: &str) -> Option<f64> {
        let mut state = self.state.lock().unwrap();
        let latest = *state.samples.back()?;
        revalue(&mut state, user, latest)
    }

    /* Partial exit. Strictly less than the full revalued stake: withdrawing
     * everything goes through uninvest_all instead.
     */
    pub fn uninvest(&self, user: &str, amount: f64) -> Result<f64, MarketError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(MarketError::MarketClosed);
        }
        if !(amount > 0.0) {
            return Err(MarketError::InvalidAmount);
        }
        if !state.positions.contains_key(user) {
            return Err(MarketError::NoPosition);
        }
        let latest = *state.samples.back().ok_or(MarketError::NoHeartRate)?;
        let current = revalue(&mut state, user, latest).ok_or(MarketError::NoPosition)?;
        if current <= amount {
            return Err(MarketError::InsufficientFunds);
        }

        let remaining = current - amount;
        if remaining < BASICALLY_ZERO {
            state.positions.remove(user);
        } else {
            state.positions.insert(
                user.to_string(),
                StockPosition {
                    stake: remaining,
                    entry_heart_rate: latest,
                },
            );
        }
        Ok(amount)
    }

    // Full exit. Returns 0 for users with no position.
    pub fn uninvest_all(&self, user: &str) -> f64 {
        let mut state = self.state.lock().unwrap();
        let latest = match state.samples.back() {
            Some(latest) => *latest,
            None => return 0.0,
        };
        let value = revalue(&mut state, user, latest).unwrap_or(0.0);
        state.positions.remove(user);
        value
    }

    /* Closes the market for good and drains every open position at its last
     * revalued price. The caller applies the payouts to the ledger.
     */
    pub fn close(&self) -> Result<Vec<UserReturn>, MarketError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(MarketError::MarketClosed);
        }
        state.closed = true;

        let latest = state.samples.back().copied();
        let users: Vec<String> = state.positions.keys().cloned().collect();
        let mut returns = Vec::with_capacity(users.len());
        for user in users {
            let payout = match latest {
                Some(latest) => revalue(&mut state, &user, latest).unwrap_or(0.0),
                None => 0.0,
            };
            returns.push(UserReturn { user, payout });
        }
        state.positions.clear();
        Ok(returns)
    }
}

// Revalues a position against the given sample and persists the new baseline.
// Returns None (and evicts) when there is no position left worth tracking.
fn revalue(state: &mut MarketState, user: &str, latest: f64) -> Option<f64> {
    let position = state.positions.get(user)?;
    let value = latest / position.entry_heart_rate * position.stake;
    if value < BASICALLY_ZERO {
        state.positions.remove(user);
        return None;
    }
    state.positions.insert(
        user.to_string(),
        StockPosition {
            stake: value,
            entry_heart_rate: latest,
        },
    );
    Some(value)
}
