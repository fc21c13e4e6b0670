use async_trait::async_trait;
use reqwest::Client;

use super::ledger::{Ledger, LedgerError};

/* API contains the clients for the external HTTP collaborators: the points
 * service backing the ledger, and the attachment store that resolves image
 * tags. Unreachable collaborators degrade to defaults, they never crash the
 * core.
 */

// Ledger backend on the points web service.
// GET  {url}?username=X            -> balance as plain text
// POST {url}?username=X&points=Y   -> 200 | 4xx
// POST {url}/adjust?username=X&delta=D -> new balance | 409 when unaffordable
pub struct HttpLedger {
    client: Client,
    url: String,
}

impl HttpLedger {
    pub fn new(url: &str) -> Self {
        HttpLedger {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

fn unavailable(err: reqwest::Error) -> LedgerError {
    LedgerError::Unavailable(err.to_string())
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn balance(&self, user: &str) -> Result<f64, LedgerError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("username", user)])
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            // Balance unknown reads as 0 by contract.
            log::warn!(
                "points service returned {} for {user}, defaulting to 0",
                response.status()
            );
            return Ok(0.0);
        }
        let body = response.text().await.map_err(unavailable)?;
        body.trim()
            .parse::<f64>()
            .map_err(|_| LedgerError::Unavailable(format!("malformed balance: {body:?}")))
    }

    async fn adjust(&self, user: &str, delta: f64) -> Result<f64, LedgerError> {
        let response = self
            .client
            .post(format!("{}/adjust", self.url))
            .query(&[("username", user.to_string()), ("delta", delta.to_string())])
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(LedgerError::Insufficient);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "points service returned {}",
                response.status()
            )));
        }
        let body = response.text().await.map_err(unavailable)?;
        body.trim()
            .parse::<f64>()
            .map_err(|_| LedgerError::Unavailable(format!("malformed balance: {body:?}")))
    }

    async fn set_balance(&self, user: &str, value: f64) -> Result<(), LedgerError> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("username", user.to_string()), ("points", value.to_string())])
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            log::error!("could not set points for {user}");
            return Err(LedgerError::Unavailable(format!(
                "points service returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    // Whether a registered attachment exists for the tag. Failures read as false.
    async fn tag_exists(&self, tag: &str) -> bool;
}

// Accepts every tag. Used when no attachment store is configured.
pub struct PermissiveAttachmentStore;

#[async_trait]
impl AttachmentStore for PermissiveAttachmentStore {
    async fn tag_exists(&self, _tag: &str) -> bool {
        true
    }
}

pub struct HttpAttachmentStore {
    client: Client,
    url: String,
}

impl HttpAttachmentStore {
    pub fn new(url: &str) -> Self {
        HttpAttachmentStore {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    async fn tag_exists(&self, tag: &str) -> bool {
        let response = self
            .client
            .get(&self.url)
            .query(&[("tag", tag)])
            .send()
            .await;
        match response {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                log::error!("attachment store unreachable: {err}");
                false
            }
        }
    }
}
