use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, Script};

use super::connect::RedisHandle;
use crate::bot::ledger::{Ledger, LedgerError};

const POINTS_KEY: &str = "points";

/* Balance check and write in one EVAL, so two concurrent adjustments for the
 * same user can never both observe the pre-update balance. Returns nil when
 * the adjustment would go negative.
 */
const ADJUST_SCRIPT: &str = r#"
local balance = tonumber(redis.call('GET', KEYS[1]) or '0')
local updated = balance + tonumber(ARGV[1])
if updated < 0 then
    return false
end
redis.call('SET', KEYS[1], updated)
return tostring(updated)
"#;

fn points_key(user: &str) -> String {
    format!("{POINTS_KEY}:{}", user.to_lowercase())
}

// Gets a user's balance, 0 when absent
async fn get_points(handle: &RedisHandle, user: &str) -> Result<f64, RedisError> {
    let mut con = handle.connection().await?;
    let balance: Option<f64> = con.get(points_key(user)).await?;
    Ok(balance.unwrap_or(0.0))
}

// Overwrites a user's balance unconditionally
async fn set_points(handle: &RedisHandle, user: &str, value: f64) -> Result<(), RedisError> {
    let mut con = handle.connection().await?;
    con.set(points_key(user), value).await
}

// Atomically applies delta; None means the user could not afford it
async fn adjust_points(
    handle: &RedisHandle,
    user: &str,
    delta: f64,
) -> Result<Option<f64>, RedisError> {
    let mut con = handle.connection().await?;
    let updated: Option<String> = Script::new(ADJUST_SCRIPT)
        .key(points_key(user))
        .arg(delta)
        .invoke_async(&mut con)
        .await?;
    match updated {
        Some(raw) => Ok(raw.parse::<f64>().ok()),
        None => Ok(None),
    }
}

// Ledger backend on Redis.
pub struct RedisLedger {
    handle: RedisHandle,
}

impl RedisLedger {
    pub fn new(handle: RedisHandle) -> Self {
        RedisLedger { handle }
    }
}

fn unavailable(err: RedisError) -> LedgerError {
    LedgerError::Unavailable(err.to_string())
}

#[async_trait]
impl Ledger for RedisLedger {
    async fn balance(&self, user: &str) -> Result<f64, LedgerError> {
        get_points(&self.handle, user).await.map_err(unavailable)
    }

    async fn adjust(&self, user: &str, delta: f64) -> Result<f64, LedgerError> {
        match adjust_points(&self.handle, user, delta).await {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => Err(LedgerError::Insufficient),
            Err(err) => Err(unavailable(err)),
        }
    }

    async fn set_balance(&self, user: &str, value: f64) -> Result<(), LedgerError> {
        set_points(&self.handle, user, value)
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::super::connect::{RedisHandle, REDIS_URL_DEFAULT};
    use super::RedisLedger;
    use crate::bot::ledger::{Ledger, LedgerError};

    fn ledger() -> RedisLedger {
        RedisLedger::new(RedisHandle::open(REDIS_URL_DEFAULT).unwrap())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_adjust_round_trip() {
        let ledger = ledger();
        ledger.set_balance("streamscribe_test", 100.0).await.unwrap();
        assert_eq!(ledger.adjust("streamscribe_test", -60.0).await, Ok(40.0));
        assert_eq!(
            ledger.adjust("streamscribe_test", -60.0).await,
            Err(LedgerError::Insufficient)
        );
        assert_eq!(ledger.balance("streamscribe_test").await, Ok(40.0));
    }
}
