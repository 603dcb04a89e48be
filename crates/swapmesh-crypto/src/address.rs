//! Address and secret encodings.
//!
//! - UTXO chains: base58check P2PKH addresses and compressed-key WIF.
//! - Account chains: EIP-55 mixed-case hex addresses.

use swapmesh_types::{Result, SwapMeshError};
use zeroize::Zeroize;

use crate::hash::{hash160, keccak256};

/// Base58check P2PKH address for a compressed public key.
pub fn p2pkh_address(public_key: &[u8; 33], version: u8) -> String {
    bs58::encode(hash160(public_key))
        .with_check_version(version)
        .into_string()
}

/// Wallet Import Format for a private key whose public key is used
/// compressed (trailing `0x01` flag).
pub fn private_key_to_wif(secret: &[u8; 32], version: u8) -> String {
    let mut payload = [0u8; 33];
    payload[..32].copy_from_slice(secret);
    payload[32] = 0x01;

    let wif = bs58::encode(&payload).with_check_version(version).into_string();
    payload.zeroize();
    wif
}

/// Decodes a base58check string into `(version, payload)`.
pub fn decode_base58check(encoded: &str) -> Result<(u8, Vec<u8>)> {
    let bytes = bs58::decode(encoded)
        .with_check(None)
        .into_vec()
        .map_err(|e| SwapMeshError::CryptoError {
            reason: format!("invalid base58check string: {e}"),
        })?;
    match bytes.split_first() {
        Some((version, payload)) => Ok((*version, payload.to_vec())),
        None => Err(SwapMeshError::CryptoError {
            reason: "empty base58check payload".into(),
        }),
    }
}

/// EIP-55 address for an uncompressed SEC1 public key (`0x04 || X || Y`).
pub fn eth_address(public_key: &[u8; 65]) -> String {
    let digest = keccak256(&public_key[1..]);
    to_checksum_address(&hex::encode(&digest[12..]))
}

/// Applies the EIP-55 mixed-case checksum to a 40-digit hex address,
/// with or without the `0x` prefix.
pub fn to_checksum_address(address: &str) -> String {
    let lower = address
        .strip_prefix("0x")
        .unwrap_or(address)
        .to_ascii_lowercase();
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
