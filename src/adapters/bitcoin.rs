//! Bitcoin forwarder adapter
//!
//! The forwarder is a REST service that watches deposit addresses and pays
//! out burn requests on Bitcoin. Two waits are built on it:
//!
//! - deposit: poll the address until a reveal (or commit) transaction shows
//!   up, then poll that transaction until it has enough confirmations
//! - unwrap: poll for the Bitcoin transaction paying out a burn serial

use alloy::primitives::U256;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BridgeError, Result};
use crate::polling::{long_poll, poll_until_some, PollConfig};

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    #[serde(default)]
    pub reveal_tx: Option<String>,
    #[serde(default)]
    pub commit_tx: Option<String>,
}

impl AddressInfo {
    /// Deposit transaction to follow; the reveal supersedes the commit
    pub fn deposit_tx(&self) -> Option<&str> {
        self.reveal_tx
            .as_deref()
            .or(self.commit_tx.as_deref())
            .filter(|tx| !tx.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TxInfo {
    #[serde(default)]
    pub confirmations: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct SerialTx {
    #[serde(default)]
    tx_id: Option<String>,
}

/// A confirmed deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcDeposit {
    pub tx_id: String,
    pub confirmations: u64,
}

/// REST client for one forwarder
#[derive(Debug, Clone)]
pub struct ForwarderClient {
    client: Client,
    base_url: String,
}

impl ForwarderClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `GET {forwarder}/address?address=`
    pub async fn address_info(&self, address: &str) -> Result<Option<AddressInfo>> {
        let url = format!("{}/address", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("address", address)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    /// `GET {forwarder}/tx?txid=`
    pub async fn tx_info(&self, tx_id: &str) -> Result<Option<TxInfo>> {
        let url = format!("{}/tx", self.base_url);
        let response = self.client.get(&url).query(&[("txid", tx_id)]).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    /// `GET {forwarder}/unwrap/serial-tx/{serial}`; `None` until paid out
    pub async fn unwrap_tx(&self, serial: U256) -> Result<Option<String>> {
        let url = format!("{}/unwrap/serial-tx/{}", self.base_url, serial);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: SerialTx = response.error_for_status()?.json().await?;
        Ok(body.tx_id.filter(|tx| !tx.is_empty()))
    }

    /// Wait for a deposit to `address` and for `required_confirmations`
    ///
    /// `on_confirmations` runs on every tick of the second phase, with 0
    /// while the forwarder does not know the transaction yet.
    pub async fn wait_for_deposit<C>(
        &self,
        address: &str,
        required_confirmations: u64,
        on_confirmations: C,
        deposit_poll: PollConfig,
        confirmations_poll: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<BtcDeposit>
    where
        C: Fn(u64) + Send + Sync,
    {
        let tx_id = poll_until_some(
            "btc deposit",
            move || async move {
                let info = self.address_info(address).await?;
                Ok(info.and_then(|i| i.deposit_tx().map(str::to_string)))
            },
            deposit_poll,
            cancel,
        )
        .await?;

        info!(address = %address, tx_id = %tx_id, "Bitcoin deposit seen");

        let tx_ref = tx_id.as_str();
        let callback = &on_confirmations;
        let confirmations = long_poll(
            "btc confirmations",
            move || async move {
                let confirmations = self
                    .tx_info(tx_ref)
                    .await?
                    .map(|info| info.confirmations)
                    .unwrap_or(0);
                callback(confirmations);
                debug!(tx_id = %tx_ref, confirmations, "Bitcoin confirmations");
                Ok(Some(confirmations))
            },
            |confirmations| *confirmations >= required_confirmations,
            confirmations_poll,
            cancel,
        )
        .await?;

        Ok(BtcDeposit {
            tx_id,
            confirmations,
        })
    }

    /// Wait for the Bitcoin transaction paying out burn `serial`
    pub async fn wait_for_unwrap(
        &self,
        serial: U256,
        poll: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let tx_id = poll_until_some(
            "btc unwrap",
            move || async move { self.unwrap_tx(serial).await },
            poll,
            cancel,
        )
        .await?;

        info!(serial = %serial, tx_id = %tx_id, "Bitcoin unwrap paid out");
        Ok(tx_id)
    }
}

/// Forwarder base URL of a Bitcoin chain, or a missing-contract error
pub fn forwarder_url(chain: &crate::config::ChainConfig) -> Result<&str> {
    chain
        .forwarder_url
        .as_deref()
        .ok_or(BridgeError::MissingContract {
            chain_id: chain.chain_id,
            role: "forwarder",
        })
}
