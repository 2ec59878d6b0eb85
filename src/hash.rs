//! Hash computation for cross-chain request IDs
//!
//! Matches the portal and synthesis contract implementations so a source
//! event and its destination completion can be joined without shared state.
//!
//! ## EVM / Tron
//!
//! ```solidity
//! internalID = keccak256(abi.encodePacked(address contract, uint256 counter, uint256 chainId))
//! externalID = keccak256(abi.encodePacked(bytes32 internalID, address receiveSide, address revertableAddress, uint256 chainId))
//! ```
//!
//! ## Cosmos
//!
//! SHA-256 over the raw account bytes, 32-byte big-endian words and the
//! chain id as 8 big-endian bytes.

use alloy::primitives::{Address, B256, U256};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use crate::address_codec::{account_bytes, normalize_address};
use crate::error::{BridgeError, Result};
use crate::types::ChainFamily;

/// Counter used when an internal id must be precomputed before the
/// contract's nonce is known (quoting a not-yet-sent revert)
pub const INTERNAL_ID_SENTINEL: U256 = U256::MAX;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Compute sha256 hash of data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ============================================================================
// EVM Hash Functions
// ============================================================================

/// Internal id of a request on an EVM-family source chain
pub fn evm_internal_id(contract: &Address, counter: U256, chain_id: u64) -> B256 {
    // abi.encodePacked layout: 20 + 32 + 32 = 84 bytes
    let mut data = [0u8; 84];
    data[0..20].copy_from_slice(contract.as_slice());
    data[20..52].copy_from_slice(&counter.to_be_bytes::<32>());
    data[52..84].copy_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    B256::from(keccak256(&data))
}

/// External id of a request headed to an EVM-family destination chain
pub fn evm_external_id(
    internal_id: &B256,
    receive_side: &Address,
    revertable_address: &Address,
    chain_id: u64,
) -> B256 {
    // abi.encodePacked layout: 32 + 20 + 20 + 32 = 104 bytes
    let mut data = [0u8; 104];
    data[0..32].copy_from_slice(internal_id.as_slice());
    data[32..52].copy_from_slice(receive_side.as_slice());
    data[52..72].copy_from_slice(revertable_address.as_slice());
    data[72..104].copy_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    B256::from(keccak256(&data))
}

// ============================================================================
// Cosmos Hash Functions
// ============================================================================

/// Internal id of a request on a Cosmos-family source chain
pub fn cosmos_internal_id(contract: &[u8], counter: U256, chain_id: u64) -> B256 {
    let mut data = Vec::with_capacity(contract.len() + 32 + 8);
    data.extend_from_slice(contract);
    data.extend_from_slice(&counter.to_be_bytes::<32>());
    data.extend_from_slice(&chain_id.to_be_bytes());
    B256::from(sha256(&data))
}

/// External id of a request headed to a Cosmos-family destination chain
pub fn cosmos_external_id(
    internal_id: &B256,
    receive_side: &[u8],
    revertable_address: &[u8],
    chain_id: u64,
) -> B256 {
    let mut data =
        Vec::with_capacity(32 + receive_side.len() + revertable_address.len() + 8);
    data.extend_from_slice(internal_id.as_slice());
    data.extend_from_slice(receive_side);
    data.extend_from_slice(revertable_address);
    data.extend_from_slice(&chain_id.to_be_bytes());
    B256::from(sha256(&data))
}

// ============================================================================
// Family Dispatch
// ============================================================================

/// Derive the internal id for a request emitted on a chain of `family`
pub fn derive_internal_id(
    family: ChainFamily,
    contract: &str,
    counter: U256,
    chain_id: u64,
) -> Result<B256> {
    match family {
        ChainFamily::Evm | ChainFamily::Tron => {
            let contract = normalize_address(family, contract)?;
            Ok(evm_internal_id(&contract, counter, chain_id))
        }
        ChainFamily::Cosmos => {
            let contract = account_bytes(family, contract)?;
            Ok(cosmos_internal_id(&contract, counter, chain_id))
        }
        ChainFamily::Ton | ChainFamily::Bitcoin => Err(BridgeError::UnsupportedFamily {
            family,
            operation: "internal id derivation",
        }),
    }
}

/// Derive the external id for a request headed to a chain of `family`
///
/// `receive_side` is the destination contract in that chain's native form.
pub fn derive_external_id(
    family: ChainFamily,
    internal_id: &B256,
    receive_side: &str,
    revertable_address: &str,
    chain_id: u64,
) -> Result<B256> {
    match family {
        ChainFamily::Evm | ChainFamily::Tron => {
            let receive_side = normalize_address(family, receive_side)?;
            let revertable = normalize_address(family, revertable_address)?;
            Ok(evm_external_id(internal_id, &receive_side, &revertable, chain_id))
        }
        ChainFamily::Cosmos => {
            let receive_side = account_bytes(family, receive_side)?;
            let revertable = account_bytes(family, revertable_address)?;
            Ok(cosmos_external_id(
                internal_id,
                &receive_side,
                &revertable,
                chain_id,
            ))
        }
        ChainFamily::Ton | ChainFamily::Bitcoin => Err(BridgeError::UnsupportedFamily {
            family,
            operation: "external id derivation",
        }),
    }
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_codec::{encode_bech32_address, encode_evm_address, to_tron_base58};

    const PORTAL: &str = "0x5523985926Aa12BA58DC5Ad00DDca99678D7227E";
    const USER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_keccak256() {
        let result = keccak256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_sha256() {
        let result = sha256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_evm_internal_id_matches_alloy_packed() {
        let contract: Address = PORTAL.parse().unwrap();
        let counter = U256::from(7u64);
        let expected = alloy::primitives::keccak256(
            [
                contract.as_slice(),
                &counter.to_be_bytes::<32>()[..],
                &U256::from(56u64).to_be_bytes::<32>()[..],
            ]
            .concat(),
        );
        assert_eq!(evm_internal_id(&contract, counter, 56), expected);
    }

    #[test]
    fn test_external_id_deterministic() {
        let internal = B256::repeat_byte(0xaa);
        let a = derive_external_id(ChainFamily::Evm, &internal, PORTAL, USER, 137).unwrap();
        let b = derive_external_id(ChainFamily::Evm, &internal, PORTAL, USER, 137).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_external_id_single_field_sensitivity() {
        let internal = B256::repeat_byte(0xaa);
        let base = derive_external_id(ChainFamily::Evm, &internal, PORTAL, USER, 137).unwrap();

        let other_internal = B256::repeat_byte(0xab);
        let other_portal = "0x5523985926Aa12BA58DC5Ad00DDca99678D7227F";
        let other_user = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92267";

        let variants = [
            derive_external_id(ChainFamily::Evm, &other_internal, PORTAL, USER, 137).unwrap(),
            derive_external_id(ChainFamily::Evm, &internal, other_portal, USER, 137).unwrap(),
            derive_external_id(ChainFamily::Evm, &internal, PORTAL, other_user, 137).unwrap(),
            derive_external_id(ChainFamily::Evm, &internal, PORTAL, USER, 138).unwrap(),
            // Swapped address roles
            derive_external_id(ChainFamily::Evm, &internal, USER, PORTAL, 137).unwrap(),
        ];
        for variant in variants {
            assert_ne!(variant, base);
        }
    }

    #[test]
    fn test_external_id_encoding_insensitive() {
        let internal = B256::repeat_byte(0x01);
        let lower = derive_external_id(
            ChainFamily::Evm,
            &internal,
            &PORTAL.to_lowercase(),
            &USER.to_lowercase(),
            1,
        )
        .unwrap();
        let mixed = derive_external_id(ChainFamily::Evm, &internal, PORTAL, USER, 1).unwrap();
        assert_eq!(lower, mixed);
    }

    #[test]
    fn test_tron_base58_hashes_like_evm_hex() {
        let internal = B256::repeat_byte(0x42);
        let portal: Address = PORTAL.parse().unwrap();
        let user: Address = USER.parse().unwrap();

        let via_base58 = derive_external_id(
            ChainFamily::Tron,
            &internal,
            &to_tron_base58(&portal),
            &to_tron_base58(&user),
            728126428,
        )
        .unwrap();
        let via_hex = derive_external_id(
            ChainFamily::Evm,
            &internal,
            &encode_evm_address(&portal),
            &encode_evm_address(&user),
            728126428,
        )
        .unwrap();
        assert_eq!(via_base58, via_hex);
    }

    #[test]
    fn test_cosmos_uses_distinct_hash() {
        let internal = B256::repeat_byte(0x10);
        let portal = encode_bech32_address(&[0x01u8; 20], "sei").unwrap();
        let user = encode_bech32_address(&[0x02u8; 20], "sei").unwrap();

        let cosmos = derive_external_id(ChainFamily::Cosmos, &internal, &portal, &user, 1329)
            .unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(internal.as_slice());
        expected.extend_from_slice(&[0x01u8; 20]);
        expected.extend_from_slice(&[0x02u8; 20]);
        expected.extend_from_slice(&1329u64.to_be_bytes());
        assert_eq!(cosmos, B256::from(sha256(&expected)));

        let evm = evm_external_id(
            &internal,
            &Address::repeat_byte(0x01),
            &Address::repeat_byte(0x02),
            1329,
        );
        assert_ne!(cosmos, evm);
    }

    #[test]
    fn test_cosmos_internal_id_layout() {
        let contract = encode_bech32_address(&[0x07u8; 32], "sei").unwrap();
        let id = derive_internal_id(ChainFamily::Cosmos, &contract, U256::from(3u64), 1329)
            .unwrap();

        let mut expected = vec![0x07u8; 32];
        expected.extend_from_slice(&U256::from(3u64).to_be_bytes::<32>());
        expected.extend_from_slice(&1329u64.to_be_bytes());
        assert_eq!(id, B256::from(sha256(&expected)));
    }

    #[test]
    fn test_sentinel_counter_differs_from_nonce() {
        let sentinel = derive_internal_id(ChainFamily::Evm, PORTAL, INTERNAL_ID_SENTINEL, 1)
            .unwrap();
        let zero = derive_internal_id(ChainFamily::Evm, PORTAL, U256::ZERO, 1).unwrap();
        assert_ne!(sentinel, zero);
    }

    #[test]
    fn test_unsupported_family() {
        let internal = B256::ZERO;
        assert!(matches!(
            derive_external_id(ChainFamily::Ton, &internal, PORTAL, USER, 1),
            Err(BridgeError::UnsupportedFamily { .. })
        ));
        assert!(derive_internal_id(ChainFamily::Bitcoin, PORTAL, U256::ZERO, 1).is_err());
    }
}
