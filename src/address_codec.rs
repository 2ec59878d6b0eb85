//! Chain-native address normalization
//!
//! Every family that takes part in id derivation is reduced to a canonical
//! 20-byte EVM-equivalent [`Address`] before hashing:
//!
//! - EVM: `0x` hex in any case, or a 32-byte left-padded word
//! - Tron: base58check (`T...`) or `41`-prefixed hex
//! - Cosmos: bech32 (`sei1...`), or `0x` hex for its EVM side
//!
//! Normalizing an already-normalized address returns the same value.

use alloy::primitives::Address;
use bech32::{self, FromBase32, ToBase32, Variant};

use crate::error::{BridgeError, Result};
use crate::types::ChainFamily;

/// Version byte prefixed to Tron account addresses
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

// ============================================================================
// EVM
// ============================================================================

/// Parse a 0x-prefixed EVM address, accepting 20-byte or 32-byte padded form
pub fn parse_evm_address(addr: &str) -> Result<Address> {
    let hex_str = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);

    let bytes =
        hex::decode(hex_str).map_err(|e| BridgeError::invalid_address(addr, e))?;

    match bytes.len() {
        20 => Ok(Address::from_slice(&bytes)),
        32 => {
            if bytes[..12].iter().any(|b| *b != 0) {
                return Err(BridgeError::invalid_address(
                    addr,
                    "32-byte form must be left-padded with zeros",
                ));
            }
            Ok(Address::from_slice(&bytes[12..]))
        }
        n => Err(BridgeError::invalid_address(
            addr,
            format!("expected 20 or 32 bytes, got {}", n),
        )),
    }
}

/// Lowercase 0x-prefixed hex, the canonical string form used in ids and logs
pub fn encode_evm_address(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}

// ============================================================================
// Tron
// ============================================================================

/// Parse a Tron address from base58check, `41`-prefixed hex or plain EVM hex
pub fn parse_tron_address(addr: &str) -> Result<Address> {
    if addr.starts_with('T') {
        let decoded = bs58::decode(addr)
            .with_check(None)
            .into_vec()
            .map_err(|e| BridgeError::invalid_address(addr, e))?;
        return strip_tron_prefix(addr, &decoded);
    }

    let hex_str = addr.strip_prefix("0x").unwrap_or(addr);
    if hex_str.len() == 42 && hex_str.starts_with("41") {
        let decoded =
            hex::decode(hex_str).map_err(|e| BridgeError::invalid_address(addr, e))?;
        return strip_tron_prefix(addr, &decoded);
    }

    parse_evm_address(addr)
}

fn strip_tron_prefix(addr: &str, decoded: &[u8]) -> Result<Address> {
    if decoded.len() != 21 {
        return Err(BridgeError::invalid_address(
            addr,
            format!("expected 21 bytes, got {}", decoded.len()),
        ));
    }
    if decoded[0] != TRON_ADDRESS_PREFIX {
        return Err(BridgeError::invalid_address(
            addr,
            format!("unexpected version byte 0x{:02x}", decoded[0]),
        ));
    }
    Ok(Address::from_slice(&decoded[1..]))
}

/// Encode an address as Tron base58check (`T...`)
pub fn to_tron_base58(addr: &Address) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(addr.as_slice());
    bs58::encode(payload).with_check().into_string()
}

// ============================================================================
// Cosmos
// ============================================================================

/// Decode a bech32 address to its raw account bytes (20 or 32) and prefix
pub fn decode_bech32_address(addr: &str) -> Result<(Vec<u8>, String)> {
    let (hrp, data, _variant) =
        bech32::decode(addr).map_err(|e| BridgeError::invalid_address(addr, e))?;

    let bytes =
        Vec::<u8>::from_base32(&data).map_err(|e| BridgeError::invalid_address(addr, e))?;

    if bytes.len() != 20 && bytes.len() != 32 {
        return Err(BridgeError::invalid_address(
            addr,
            format!("expected 20 or 32 bytes, got {}", bytes.len()),
        ));
    }

    Ok((bytes, hrp))
}

/// Encode raw account bytes as bech32 with the given prefix
pub fn encode_bech32_address(bytes: &[u8], hrp: &str) -> Result<String> {
    bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)
        .map_err(|e| BridgeError::invalid_address(hrp, e))
}

// ============================================================================
// Family Dispatch
// ============================================================================

/// Normalize a chain-native address to its 20-byte EVM equivalent
pub fn normalize_address(family: ChainFamily, addr: &str) -> Result<Address> {
    let addr = addr.trim();
    match family {
        ChainFamily::Evm => parse_evm_address(addr),
        ChainFamily::Tron => parse_tron_address(addr),
        ChainFamily::Cosmos => {
            if addr.starts_with("0x") {
                return parse_evm_address(addr);
            }
            let (bytes, _hrp) = decode_bech32_address(addr)?;
            if bytes.len() != 20 {
                return Err(BridgeError::invalid_address(
                    addr,
                    "32-byte account has no EVM equivalent",
                ));
            }
            Ok(Address::from_slice(&bytes))
        }
        ChainFamily::Ton | ChainFamily::Bitcoin => Err(BridgeError::UnsupportedFamily {
            family,
            operation: "address normalization",
        }),
    }
}

/// Raw account bytes used by byte-concatenation hashes
///
/// Bech32 accounts keep their native length; hex input yields 20 bytes.
pub fn account_bytes(family: ChainFamily, addr: &str) -> Result<Vec<u8>> {
    let addr = addr.trim();
    match family {
        ChainFamily::Cosmos if !addr.starts_with("0x") => {
            let (bytes, _hrp) = decode_bech32_address(addr)?;
            Ok(bytes)
        }
        _ => Ok(normalize_address(family, addr)?.to_vec()),
    }
}
