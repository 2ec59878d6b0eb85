//! TON ledger-scan adapter
//!
//! TON has no indexed event logs. The portal announces a completed burn by
//! sending an external-out message (no destination) whose body starts with
//! the burn-completed opcode followed by the 32-byte external id. Every poll
//! re-reads the portal's most recent transactions and scans their outbound
//! messages.

use alloy::primitives::B256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::polling::{poll_until_some, PollConfig};

/// Opcode of the portal's burn-completed external message
pub const DEFAULT_BURN_COMPLETED_OPCODE: u32 = 0x7a2e_91c4;

/// Transactions re-read on every scan
pub const DEFAULT_SCAN_LIMIT: u32 = 64;

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

// ============================================================================
// toncenter v3 responses
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsResponse {
    #[serde(default)]
    pub transactions: Vec<TonTransaction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TonTransaction {
    pub hash: String,
    #[serde(default)]
    pub out_msgs: Vec<TonMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TonMessage {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub message_content: Option<MessageContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageContent {
    /// Base64 bag-of-cells
    #[serde(default)]
    pub body: Option<String>,
}

impl TonMessage {
    /// External-out messages have no destination
    pub fn is_external_out(&self) -> bool {
        self.destination.as_deref().map_or(true, str::is_empty)
    }
}

// ============================================================================
// Bag-of-cells
// ============================================================================

/// Data bytes of the root cell of a serialized bag-of-cells
///
/// Only what the burn message needs is supported: ordinary cells, any
/// number of them, with or without index and CRC.
pub fn root_cell_data(boc: &[u8]) -> Result<Vec<u8>> {
    let mut reader = ByteReader::new(boc);

    if reader.take(4)? != BOC_MAGIC {
        return Err(BridgeError::Decode("not a bag-of-cells".to_string()));
    }

    let flags = reader.byte()?;
    let has_index = flags & 0x80 != 0;
    let ref_size = (flags & 0x07) as usize;
    let offset_size = reader.byte()? as usize;
    if ref_size == 0 || ref_size > 4 || offset_size == 0 || offset_size > 8 {
        return Err(BridgeError::Decode("invalid bag-of-cells header".to_string()));
    }

    let cell_count = reader.uint(ref_size)?;
    let root_count = reader.uint(ref_size)?;
    let _absent = reader.uint(ref_size)?;
    let _total_size = reader.uint(offset_size)?;
    if root_count == 0 {
        return Err(BridgeError::Decode("bag-of-cells has no root".to_string()));
    }
    let root_index = reader.uint(ref_size)?;
    reader.skip((root_count - 1) as usize * ref_size)?;
    if has_index {
        reader.skip(cell_count as usize * offset_size)?;
    }
    if root_index >= cell_count {
        return Err(BridgeError::Decode("root index out of range".to_string()));
    }

    for index in 0..cell_count {
        let d1 = reader.byte()?;
        let d2 = reader.byte()?;
        let refs = (d1 & 0x07) as usize;
        let data_len = (d2 as usize + 1) / 2;
        let data = reader.take(data_len)?;
        reader.skip(refs * ref_size)?;
        if index == root_index {
            return Ok(data.to_vec());
        }
    }

    Err(BridgeError::Decode("root cell missing".to_string()))
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| BridgeError::Decode("truncated bag-of-cells".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, n: usize) -> Result<u64> {
        Ok(self
            .take(n)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }
}

/// Opcode and external id carried by a burn-completed body, if it is one
pub fn parse_burn_completed(body_base64: &str, opcode: u32) -> Result<Option<B256>> {
    let boc = BASE64
        .decode(body_base64.trim())
        .map_err(|e| BridgeError::Decode(format!("message body: {}", e)))?;
    let data = root_cell_data(&boc)?;
    if data.len() < 36 {
        return Ok(None);
    }
    if data[0..4] != opcode.to_be_bytes() {
        return Ok(None);
    }
    Ok(Some(B256::from_slice(&data[4..36])))
}

/// Hash of the transaction carrying the burn-completed message for
/// `external_id`, if present in `transactions`
pub fn find_burn_completed(
    transactions: &[TonTransaction],
    external_id: &B256,
    opcode: u32,
) -> Option<String> {
    for tx in transactions {
        for msg in tx.out_msgs.iter().filter(|m| m.is_external_out()) {
            let Some(body) = msg.message_content.as_ref().and_then(|c| c.body.as_deref()) else {
                continue;
            };
            match parse_burn_completed(body, opcode) {
                Ok(Some(id)) if id == *external_id => return Some(tx.hash.clone()),
                Ok(_) => {}
                Err(e) => debug!(tx_hash = %tx.hash, error = %e, "Skipping undecodable message"),
            }
        }
    }
    None
}

// ============================================================================
// Client
// ============================================================================

/// toncenter client scanning one portal account
#[derive(Debug, Clone)]
pub struct TonClient {
    client: Client,
    base_url: String,
    pub opcode: u32,
    pub scan_limit: u32,
}

impl TonClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            opcode: DEFAULT_BURN_COMPLETED_OPCODE,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    /// `GET {toncenter}/api/v3/transactions?account=&limit=&sort=desc`
    pub async fn recent_transactions(&self, account: &str) -> Result<Vec<TonTransaction>> {
        let url = format!("{}/api/v3/transactions", self.base_url);
        let limit = self.scan_limit.to_string();
        let response: TransactionsResponse = self
            .client
            .get(&url)
            .query(&[
                ("account", account),
                ("limit", limit.as_str()),
                ("sort", "desc"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.transactions)
    }

    /// Poll the portal until it announces the burn for `external_id`
    pub async fn wait_for_burn_completed(
        &self,
        portal: &str,
        external_id: B256,
        poll: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<String> {
        info!(portal = %portal, external_id = %external_id, "Scanning TON portal");

        let tx_hash = poll_until_some(
            "ton burn",
            move || async move {
                let transactions = self.recent_transactions(portal).await?;
                if transactions.len() as u32 >= self.scan_limit {
                    // The window may already have scrolled past an older match
                    debug!(portal = %portal, "TON scan window full");
                }
                Ok(find_burn_completed(&transactions, &external_id, self.opcode))
            },
            poll,
            cancel,
        )
        .await
        .inspect_err(|e| {
            if e.is_timeout() {
                warn!(portal = %portal, external_id = %external_id, "TON burn not observed");
            }
        })?;

        info!(tx_hash = %tx_hash, "TON burn completed");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single-cell bag-of-cells with `data` as the root's content
    fn single_cell_boc(data: &[u8]) -> Vec<u8> {
        let mut boc = BOC_MAGIC.to_vec();
        boc.push(0x01); // no index, no crc, 1-byte refs
        boc.push(0x01); // 1-byte offsets
        boc.push(1); // cells
        boc.push(1); // roots
        boc.push(0); // absent
        boc.push((2 + data.len()) as u8); // total cell size
        boc.push(0); // root index
        boc.push(0); // d1: no refs
        boc.push((data.len() * 2) as u8); // d2: whole bytes
        boc.extend_from_slice(data);
        boc
    }

    fn burn_body(opcode: u32, external_id: B256) -> String {
        let mut data = opcode.to_be_bytes().to_vec();
        data.extend_from_slice(external_id.as_slice());
        BASE64.encode(single_cell_boc(&data))
    }

    fn tx(hash: &str, destination: Option<&str>, body: String) -> TonTransaction {
        TonTransaction {
            hash: hash.to_string(),
            out_msgs: vec![TonMessage {
                destination: destination.map(str::to_string),
                message_content: Some(MessageContent { body: Some(body) }),
            }],
        }
    }

    #[test]
    fn test_root_cell_data() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(root_cell_data(&single_cell_boc(&data)).unwrap(), data.to_vec());
    }

    #[test]
    fn test_root_cell_rejects_garbage() {
        assert!(root_cell_data(&[0, 1, 2, 3, 4]).is_err());
        let mut truncated = single_cell_boc(&[1u8; 36]);
        truncated.truncate(20);
        assert!(root_cell_data(&truncated).is_err());
    }

    #[test]
    fn test_parse_burn_completed() {
        let external_id = B256::repeat_byte(0x5a);
        let body = burn_body(DEFAULT_BURN_COMPLETED_OPCODE, external_id);
        assert_eq!(
            parse_burn_completed(&body, DEFAULT_BURN_COMPLETED_OPCODE).unwrap(),
            Some(external_id)
        );
        assert_eq!(parse_burn_completed(&body, 0x1234_5678).unwrap(), None);
    }

    #[test]
    fn test_find_burn_completed_only_external_out() {
        let target = B256::repeat_byte(0x01);
        let transactions = vec![
            tx(
                "internal",
                Some("EQDestination"),
                burn_body(DEFAULT_BURN_COMPLETED_OPCODE, target),
            ),
            tx(
                "other",
                None,
                burn_body(DEFAULT_BURN_COMPLETED_OPCODE, B256::repeat_byte(0x02)),
            ),
            tx("garbage", None, "not base64!".to_string()),
            tx(
                "match",
                None,
                burn_body(DEFAULT_BURN_COMPLETED_OPCODE, target),
            ),
        ];

        assert_eq!(
            find_burn_completed(&transactions, &target, DEFAULT_BURN_COMPLETED_OPCODE),
            Some("match".to_string())
        );
        assert_eq!(
            find_burn_completed(&transactions, &B256::ZERO, DEFAULT_BURN_COMPLETED_OPCODE),
            None
        );
    }

    #[test]
    fn test_toncenter_response_shape() {
        let json = r#"{
            "transactions": [{
                "hash": "abc=",
                "out_msgs": [{"destination": null, "message_content": {"body": "te6c"}}]
            }]
        }"#;
        let response: TransactionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.transactions.len(), 1);
        assert!(response.transactions[0].out_msgs[0].is_external_out());
    }
}
