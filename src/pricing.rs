//! Advisory fee pricing
//!
//! A revert is only built after the advisor has priced the compensating
//! call. Quotes are cached briefly; failures are cached for a shorter time
//! so a struggling advisor is not hit once per revert attempt.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::{BridgeError, Result};

const QUOTE_TTL: Duration = Duration::from_secs(60);
const QUOTE_ERROR_TTL: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Price of a compensating call, in the fee token's base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub price: U256,
    /// Amount saved against the undiscounted price, when reported
    pub save: Option<U256>,
}

#[async_trait]
pub trait FeeQuoter: Send + Sync {
    /// Price `calldata` sent to `receive_side` on `chain_id_to` from `chain_id_from`
    async fn quote_bridge_fee(
        &self,
        receive_side: Address,
        calldata: Bytes,
        chain_id_from: u64,
        chain_id_to: u64,
    ) -> Result<FeeQuote>;
}

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    chain_id_from: u64,
    chain_id_to: u64,
    receive_side: String,
    call_data: &'a Bytes,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: String,
    #[serde(default)]
    save: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Parse an advisor amount, decimal or `0x` hex
pub fn parse_amount(raw: &str) -> Result<U256> {
    U256::from_str(raw.trim())
        .map_err(|e| BridgeError::Decode(format!("advisor amount {:?}: {}", raw, e)))
}

type QuoteKey = (Address, Bytes, u64, u64);

/// HTTP client of the advisory pricing service
pub struct AdvisorClient {
    client: Client,
    base_url: String,
    cache: TtlCache<QuoteKey, FeeQuote, String>,
}

impl AdvisorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: TtlCache::new(QUOTE_TTL, QUOTE_ERROR_TTL),
        }
    }

    async fn fetch(
        &self,
        receive_side: Address,
        calldata: &Bytes,
        chain_id_from: u64,
        chain_id_to: u64,
    ) -> Result<FeeQuote> {
        let url = format!("{}/v1/quote", self.base_url);
        let body = QuoteRequest {
            chain_id_from,
            chain_id_to,
            receive_side: format!("{:#x}", receive_side),
            call_data: calldata,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("advisor returned {}", status));
            return Err(BridgeError::PriceQuote(message));
        }

        let quote: QuoteResponse = response.json().await?;
        Ok(FeeQuote {
            price: parse_amount(&quote.price)?,
            save: quote.save.as_deref().map(parse_amount).transpose()?,
        })
    }
}

#[async_trait]
impl FeeQuoter for AdvisorClient {
    async fn quote_bridge_fee(
        &self,
        receive_side: Address,
        calldata: Bytes,
        chain_id_from: u64,
        chain_id_to: u64,
    ) -> Result<FeeQuote> {
        let key = (receive_side, calldata.clone(), chain_id_from, chain_id_to);
        let calldata = &calldata;

        let outcome = self
            .cache
            .get_or_compute(key, move || async move {
                self.fetch(receive_side, calldata, chain_id_from, chain_id_to)
                    .await
                    .map_err(|e| match e {
                        BridgeError::PriceQuote(message) => message,
                        other => other.to_string(),
                    })
            })
            .await;

        match outcome {
            Ok(quote) => {
                debug!(
                    chain_id_from,
                    chain_id_to,
                    receive_side = %receive_side,
                    price = %quote.price,
                    "Fee quoted"
                );
                Ok(quote)
            }
            Err(message) => {
                warn!(chain_id_from, chain_id_to, error = %message, "Fee quote failed");
                Err(BridgeError::PriceQuote(message))
            }
        }
    }
}
