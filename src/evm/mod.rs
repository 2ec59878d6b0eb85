//! EVM Chain Support Module
//!
//! Everything that talks to chains exposing the Ethereum JSON-RPC log API
//! (EVM proper, Tron and the EVM side of Cosmos chains).
//!
//! ## Submodules
//!
//! - `client` - RPC seam, alloy implementation, primary/spare racing
//! - `contracts` - Portal, Synthesis and MetaRouter bindings using alloy sol! macro
//! - `events` - Event selectors, log queries and request log parsing
//! - `watcher` - Waiting for a completion log on a destination chain

pub mod client;
pub mod contracts;
pub mod events;
pub mod watcher;

// Re-export commonly used items
pub use client::{first_success, AlloyRpc, ChainClients, ChainRpc, RpcPool};
pub use contracts::{MetaRouter, Portal, Synthesis};
pub use events::{selectors, EventSelector, LogQuery, RequestKind, RequestLog};
pub use watcher::EvmLogWatcher;
