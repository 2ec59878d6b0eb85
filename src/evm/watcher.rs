//! EVM completion-log watching
//!
//! Waits for one specific log (a completion event keyed by external id) to
//! appear on a destination chain. Polling goes through
//! [`crate::polling::long_poll`]; log queries go through the chain's
//! [`ChainRpc`], which races spare endpoints against the primary.
//!
//! ## Usage
//!
//! ```ignore
//! let watcher = EvmLogWatcher::new(rpc, chain.chain_id, chain.filter_block_offset, poll);
//! let query = watcher
//!     .completion_query(portal, selectors::burn_completed(), external_id, None)
//!     .await?;
//! let log = watcher.wait_for_log(query, &cancel).await?;
//! ```

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BridgeError, Result};
use crate::evm::client::ChainRpc;
use crate::evm::events::{EventSelector, LogQuery};
use crate::polling::{poll_until_some, PollConfig};

/// Log watcher bound to one chain
pub struct EvmLogWatcher {
    rpc: Arc<dyn ChainRpc>,
    chain_id: u64,
    filter_block_offset: u64,
    poll: PollConfig,
}

impl EvmLogWatcher {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        chain_id: u64,
        filter_block_offset: u64,
        poll: PollConfig,
    ) -> Self {
        Self {
            rpc,
            chain_id,
            filter_block_offset,
            poll,
        }
    }

    /// Query for `selector` on `address` with the external id as topic1
    ///
    /// Without an explicit `from_block` the window starts
    /// `filter_block_offset` blocks behind the current head.
    pub async fn completion_query(
        &self,
        address: Address,
        selector: EventSelector,
        external_id: B256,
        from_block: Option<u64>,
    ) -> Result<LogQuery> {
        let from_block = match from_block {
            Some(block) => block,
            None => {
                let current = self.rpc.block_number().await?;
                current.saturating_sub(self.filter_block_offset)
            }
        };

        Ok(LogQuery::new(self.chain_id, address, selector)
            .topic1(external_id)
            .from_block(from_block))
    }

    /// Poll until a log matches `query`
    ///
    /// An exhausted budget is reported as
    /// [`BridgeError::LogTimeoutExceeded`] carrying the query.
    pub async fn wait_for_log(&self, query: LogQuery, cancel: &CancellationToken) -> Result<Log> {
        info!(chain_id = self.chain_id, query = %query, "Waiting for log");

        let rpc = &self.rpc;
        let pending = &query;
        let result = poll_until_some(
            query.event,
            move || async move {
                let logs = rpc.get_logs(pending).await?;
                debug!(chain_id = pending.chain_id, count = logs.len(), "Fetched logs");
                Ok(logs.into_iter().next())
            },
            self.poll,
            cancel,
        )
        .await;

        match result {
            Ok(log) => {
                info!(
                    chain_id = self.chain_id,
                    event = query.event,
                    tx_hash = ?log.transaction_hash,
                    "Log found"
                );
                Ok(log)
            }
            Err(BridgeError::Timeout { max_elapsed, .. }) => {
                Err(BridgeError::LogTimeoutExceeded { query, max_elapsed })
            }
            Err(e) => Err(e),
        }
    }

    /// [`Self::completion_query`] followed by [`Self::wait_for_log`]
    pub async fn wait_for_completion(
        &self,
        address: Address,
        selector: EventSelector,
        external_id: B256,
        from_block: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Log> {
        let query = self
            .completion_query(address, selector, external_id, from_block)
            .await?;
        self.wait_for_log(query, cancel).await
    }
}
