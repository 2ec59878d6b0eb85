//! ThorChain settlement adapter
//!
//! A completion transaction that deposits into the ThorChain router hands
//! the transfer to ThorChain; the final payout is the first outbound hash
//! once THORNode reports the observed inbound as `done`.

use alloy::primitives::B256;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::polling::{poll_until_some, PollConfig};

const STATUS_DONE: &str = "done";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThorTxResponse {
    #[serde(default)]
    pub observed_tx: Option<ObservedTx>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservedTx {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub out_hashes: Vec<String>,
}

impl ThorTxResponse {
    /// First outbound hash once the inbound is `done`
    pub fn settled_out_hash(&self) -> Option<&str> {
        let observed = self.observed_tx.as_ref()?;
        if observed.status.as_deref() != Some(STATUS_DONE) {
            return None;
        }
        observed.out_hashes.first().map(String::as_str)
    }
}

/// THORNode inbound hashes are upper-case hex without a prefix
pub fn thornode_tx_id(tx_hash: &B256) -> String {
    hex::encode_upper(tx_hash.as_slice())
}

#[derive(Debug, Clone)]
pub struct ThorchainClient {
    client: Client,
    base_url: String,
}

impl ThorchainClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `GET {thornode}/thorchain/tx/{hash}`; `None` while not yet observed
    pub async fn observed_tx(&self, tx_hash: &B256) -> Result<Option<ThorTxResponse>> {
        let url = format!("{}/thorchain/tx/{}", self.base_url, thornode_tx_id(tx_hash));
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    /// Poll until the inbound `tx_hash` settles and return the payout hash
    pub async fn wait_for_outbound(
        &self,
        tx_hash: B256,
        poll: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let out_hash = poll_until_some(
            "thorchain settlement",
            move || async move {
                let response = self.observed_tx(&tx_hash).await?;
                let status = response
                    .as_ref()
                    .and_then(|r| r.observed_tx.as_ref())
                    .and_then(|o| o.status.clone());
                debug!(tx_hash = %tx_hash, status = ?status, "ThorChain status");
                Ok(response.and_then(|r| r.settled_out_hash().map(str::to_string)))
            },
            poll,
            cancel,
        )
        .await?;

        info!(tx_hash = %tx_hash, out_hash = %out_hash, "ThorChain settled");
        Ok(out_hash)
    }
}
