//! Token metadata lookup
//!
//! Attaches symbol and decimals to raw on-chain amounts. A miss is not an
//! error; amounts then render as raw integers.

use std::collections::HashMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub chain_id: u64,
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

pub trait TokenRegistry: Send + Sync {
    fn find_token_by_address(&self, address: &Address, chain_id: u64) -> Option<Token>;
}

/// In-memory registry keyed by `(chain_id, address)`
#[derive(Debug, Clone, Default)]
pub struct StaticTokenRegistry {
    tokens: HashMap<(u64, Address), Token>,
}

impl StaticTokenRegistry {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| ((t.chain_id, t.address), t))
                .collect(),
        }
    }

    pub fn insert(&mut self, token: Token) {
        self.tokens.insert((token.chain_id, token.address), token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenRegistry for StaticTokenRegistry {
    fn find_token_by_address(&self, address: &Address, chain_id: u64) -> Option<Token> {
        self.tokens.get(&(chain_id, *address)).cloned()
    }
}
