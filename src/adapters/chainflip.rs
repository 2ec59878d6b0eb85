//! Chainflip settlement adapter
//!
//! A vault swap in the completion transaction hands the transfer to
//! Chainflip. The swap is tracked by the deposit transaction hash until its
//! state is `COMPLETE`; the egress transaction reference is the final hash.

use alloy::primitives::B256;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::polling::{poll_until_some, PollConfig};

const STATE_COMPLETE: &str = "COMPLETE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub swap_egress: Option<SwapEgress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEgress {
    #[serde(default)]
    pub tx_ref: Option<String>,
}

impl SwapStatus {
    /// Egress transaction once the swap is `COMPLETE`
    pub fn egress_tx(&self) -> Option<&str> {
        if self.state.as_deref() != Some(STATE_COMPLETE) {
            return None;
        }
        self.swap_egress.as_ref()?.tx_ref.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ChainflipClient {
    client: Client,
    base_url: String,
}

impl ChainflipClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `GET {api}/v2/swaps/{txHash}`
    pub async fn swap_status(&self, tx_hash: &B256) -> Result<Option<SwapStatus>> {
        let url = format!("{}/v2/swaps/{}", self.base_url, tx_hash);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    pub async fn wait_for_egress(
        &self,
        tx_hash: B256,
        poll: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let egress = poll_until_some(
            "chainflip swap",
            move || async move {
                let status = self.swap_status(&tx_hash).await?;
                debug!(
                    tx_hash = %tx_hash,
                    state = ?status.as_ref().and_then(|s| s.state.as_deref()),
                    "Chainflip swap state"
                );
                Ok(status.and_then(|s| s.egress_tx().map(str::to_string)))
            },
            poll,
            cancel,
        )
        .await?;

        info!(tx_hash = %tx_hash, egress = %egress, "Chainflip swap complete");
        Ok(egress)
    }
}
