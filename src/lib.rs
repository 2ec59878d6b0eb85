//! xchain-recovery: Transfer Correlation and Recovery for Cross-Chain Bridge Transfers
//!
//! A transfer locks or burns an asset on a source chain and relayers complete
//! it on a destination chain, sometimes through a hub chain. This crate joins
//! both sides without shared state and recovers transfers that never finish:
//!
//! - **Hash Computation** - Internal and external request ids per chain family
//! - **Address Encoding** - EVM, Tron and Cosmos address normalization
//! - **Polling** - Cancellable long-polling with per-adapter budgets
//! - **EVM Module** - RPC seam, contract bindings, event selectors, log watcher
//! - **Adapters** - Bitcoin forwarder, TON ledger scan, ThorChain, Chainflip
//! - **Waiter** - Multi-hop completion waiting with extra-step resolution
//! - **Pending** - Stuck transfer scanning for a user
//! - **Revert** - Fee-checked revert transactions, EVM and Tron envelopes
//!
//! ## Usage
//!
//! ```ignore
//! let registry = Arc::new(config::load_from_env()?.ok_or_else(|| eyre!("no chains"))?);
//! let clients = ChainClients::connect(&registry)?;
//! let extra_steps = Arc::new(HttpExtraStepWaiter::new(
//!     registry.clone(),
//!     ServiceEndpoints::from_env()?,
//!     TimeoutConfig::default(),
//! )?);
//! let waiter = CompletionWaiter::new(registry, clients, extra_steps, WaiterConfig::default());
//! let completion = waiter.wait_for_complete(56, tx_hash, &cancel).await?;
//! ```

pub mod adapters;
pub mod address_codec;
pub mod cache;
pub mod config;
pub mod error;
pub mod evm;
pub mod hash;
pub mod pending;
pub mod polling;
pub mod pricing;
pub mod revert;
pub mod tokens;
pub mod types;
pub mod waiter;

// Re-export commonly used items at the crate root
pub use adapters::{detect_extra_step, ExtraStepWaiter, HttpExtraStepWaiter, PendingExtraStep};
pub use address_codec::{encode_evm_address, normalize_address, parse_evm_address};
pub use config::{ChainConfig, ChainRegistry, ContractRole, ServiceEndpoints, TimeoutConfig};
pub use error::{BridgeError, Result};
pub use evm::{AlloyRpc, ChainClients, ChainRpc, LogQuery};
pub use hash::{derive_external_id, derive_internal_id, INTERNAL_ID_SENTINEL};
pub use pending::{OriginResolver, PendingScanner, ResolvedOrigin, ScanConfig};
pub use polling::{long_poll, PollConfig};
pub use pricing::{AdvisorClient, FeeQuote, FeeQuoter};
pub use revert::{RevertBuilder, RevertConfig, RevertTransaction, TransactionEnvelope};
pub use tokens::{StaticTokenRegistry, Token, TokenRegistry};
pub use types::{
    BridgeRequestType, BridgeTxInfo, ChainFamily, Completion, ExtraStep, ExtraStepKind,
    PendingRequestType, RequestState, TokenAmount, TransferRequest,
};
pub use waiter::{CompletionWaiter, WaiterConfig};
