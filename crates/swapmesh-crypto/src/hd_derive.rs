//! BIP32 secp256k1 hierarchical deterministic key derivation.
//!
//! Both hardened and normal children are supported, so BIP44 paths of
//! the form `m/44'/0'/0'/0/5` can be walked from a BIP39 seed.
//!
//! # Derivation
//!
//! - Master: `I = HMAC-SHA512(key="Bitcoin seed", data=seed)`.
//! - Hardened child: `I = HMAC-SHA512(chain, 0x00 || k || ser32(i + 2^31))`.
//! - Normal child: `I = HMAC-SHA512(chain, serP(K) || ser32(i))`.
//! - `k_child = parse256(IL) + k mod n`; `IL >= n` or `k_child == 0`
//!   makes the index invalid.
//!
//! Reference: <https://github.com/bitcoin/bips/blob/master/bip-0032.mediawiki>

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use k256::elliptic_curve::ff::PrimeField;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, Scalar, SecretKey};
use sha2::Sha512;
use swapmesh_types::{Result, SwapMeshError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::mnemonic::Seed;

type HmacSha512 = Hmac<Sha512>;

/// The hardened index offset (0x80000000).
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// One step of a derivation path. The inner value never includes the
/// hardened offset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildIndex {
    Normal(u32),
    Hardened(u32),
}

impl ChildIndex {
    /// The 32-bit index as serialized into the HMAC input.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Normal(i) => *i,
            Self::Hardened(i) => i | HARDENED_OFFSET,
        }
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(i) => write!(f, "{i}"),
            Self::Hardened(i) => write!(f, "{i}'"),
        }
    }
}

/// A parsed `m/...` derivation path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DerivationPath(Vec<ChildIndex>);

impl DerivationPath {
    pub fn indices(&self) -> &[ChildIndex] {
        &self.0
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.0 {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = SwapMeshError;

    /// Accepts `m/44'/0'/0'/0/0`; `'` and `h` both mark hardened steps.
    /// A bare `m` is the master key itself.
    fn from_str(path: &str) -> Result<Self> {
        let trimmed = path.trim();

        let rest = match trimmed {
            "m" => return Ok(Self(Vec::new())),
            _ => trimmed
                .strip_prefix("m/")
                .ok_or_else(|| SwapMeshError::ConfigError {
                    reason: format!("derivation path must start with 'm/', got '{trimmed}'"),
                })?,
        };

        let mut indices = Vec::new();

        for part in rest.split('/') {
            let part = part.trim();

            if part.is_empty() {
                return Err(SwapMeshError::ConfigError {
                    reason: format!("empty component in derivation path '{trimmed}'"),
                });
            }

            let (num_str, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(n) => (n, true),
                None => (part, false),
            };

            let index: u32 = num_str.parse().map_err(|e| SwapMeshError::ConfigError {
                reason: format!("invalid index '{num_str}' in path: {e}"),
            })?;

            if index >= HARDENED_OFFSET {
                return Err(SwapMeshError::ConfigError {
                    reason: format!("index {index} exceeds maximum ({})", HARDENED_OFFSET - 1),
                });
            }

            indices.push(if hardened {
                ChildIndex::Hardened(index)
            } else {
                ChildIndex::Normal(index)
            });
        }

        Ok(Self(indices))
    }
}

// ---------------------------------------------------------------------------
// ExtendedPrivateKey
// ---------------------------------------------------------------------------

/// A secp256k1 private key plus its chain code. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ExtendedPrivateKey {
    key: [u8; 32],
    chain_code: [u8; 32],
}

impl ExtendedPrivateKey {
    /// Master key from a BIP39 seed.
    pub fn from_seed(seed: &Seed) -> Result<Self> {
        Self::from_seed_bytes(seed.as_bytes())
    }

    /// Master key from raw seed bytes (16..=64 bytes in BIP32).
    pub fn from_seed_bytes(seed: &[u8]) -> Result<Self> {
        let mut i = hmac_sha512(MASTER_HMAC_KEY, seed)?;

        let mut key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        key.copy_from_slice(&i[..32]);
        chain_code.copy_from_slice(&i[32..]);
        i.zeroize();

        // Rejects zero and keys >= n.
        SecretKey::from_slice(&key).map_err(|_| SwapMeshError::CryptoError {
            reason: "seed produced an invalid master key".into(),
        })?;

        Ok(Self { key, chain_code })
    }

    /// Derives one child.
    ///
    /// # Errors
    ///
    /// [`SwapMeshError::CryptoError`] for the (astronomically rare)
    /// invalid indices; BIP32 says to skip to the next index.
    pub fn derive_child(&self, index: ChildIndex) -> Result<Self> {
        let mut data = Vec::with_capacity(37);
        match index {
            ChildIndex::Hardened(_) => {
                data.push(0x00);
                data.extend_from_slice(&self.key);
            }
            ChildIndex::Normal(_) => {
                data.extend_from_slice(&self.public_key_compressed()?);
            }
        }
        data.extend_from_slice(&index.raw().to_be_bytes());

        let mut i = hmac_sha512(&self.chain_code, &data)?;
        data.zeroize();

        let il = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::clone_from_slice(&i[..32])))
            .ok_or_else(|| SwapMeshError::CryptoError {
                reason: format!("child index {index} yields IL >= n"),
            })?;
        let parent = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::clone_from_slice(
            &self.key,
        )))
        .ok_or_else(|| SwapMeshError::CryptoError {
            reason: "parent key is not a valid scalar".into(),
        })?;

        let child = il + parent;
        if bool::from(child.is_zero()) {
            i.zeroize();
            return Err(SwapMeshError::CryptoError {
                reason: format!("child index {index} yields a zero key"),
            });
        }

        let mut key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        key.copy_from_slice(&child.to_repr());
        chain_code.copy_from_slice(&i[32..]);
        i.zeroize();

        Ok(Self { key, chain_code })
    }

    /// Walks every step of `path` from this key.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self> {
        let mut current = Self {
            key: self.key,
            chain_code: self.chain_code,
        };
        for &index in path.indices() {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// SEC1 compressed public key (33 bytes).
    pub fn public_key_compressed(&self) -> Result<[u8; 33]> {
        let point = self.secret_key()?.public_key().to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        Ok(out)
    }

    /// SEC1 uncompressed public key (65 bytes, leading `0x04`).
    pub fn public_key_uncompressed(&self) -> Result<[u8; 65]> {
        let point = self.secret_key()?.public_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        Ok(out)
    }

    fn secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.key).map_err(|e| SwapMeshError::CryptoError {
            reason: format!("invalid secp256k1 secret: {e}"),
        })
    }
}

// ExtendedPrivateKey does not implement Clone/Debug to prevent leakage.

/// Derives the key at `path` from a BIP39 seed.
pub fn derive_secp256k1_key(seed: &Seed, path: &str) -> Result<ExtendedPrivateKey> {
    let path: DerivationPath = path.parse()?;
    ExtendedPrivateKey::from_seed(seed)?.derive_path(&path)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64]> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|e| SwapMeshError::CryptoError {
        reason: format!("HMAC-SHA512 key init failed: {e}"),
    })?;
    mac.update(data);
    let result = mac.finalize().into_bytes();

    let mut output = [0u8; 64];
    output.copy_from_slice(&result);
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // --- Path parsing ---

    #[test]
    fn parse_mixed_path() -> std::result::Result<(), SwapMeshError> {
        let path: DerivationPath = "m/44'/0'/0'/0/7".parse()?;
        assert_eq!(
            path.indices(),
            &[
                ChildIndex::Hardened(44),
                ChildIndex::Hardened(0),
                ChildIndex::Hardened(0),
                ChildIndex::Normal(0),
                ChildIndex::Normal(7),
            ]
        );
        assert_eq!(path.to_string(), "m/44'/0'/0'/0/7");
        Ok(())
    }

    #[test]
    fn parse_h_suffix() -> std::result::Result<(), SwapMeshError> {
        let path: DerivationPath = "m/44h/60h".parse()?;
        assert_eq!(path.to_string(), "m/44'/60'");
        Ok(())
    }

    #[test]
    fn parse_bare_master() -> std::result::Result<(), SwapMeshError> {
        let path: DerivationPath = "m".parse()?;
        assert!(path.indices().is_empty());
        Ok(())
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["44'/0'", "m/", "m//0", "m/x'", "m/2147483648"] {
            assert!(bad.parse::<DerivationPath>().is_err(), "accepted {bad}");
        }
    }

    // --- BIP32 test vector 1 ---
    //
    // Seed (hex): 000102030405060708090a0b0c0d0e0f

    fn vector1_master() -> std::result::Result<ExtendedPrivateKey, Box<dyn std::error::Error>> {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f")?;
        Ok(ExtendedPrivateKey::from_seed_bytes(&seed)?)
    }

    #[test]
    fn bip32_vector1_master() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let master = vector1_master()?;
        assert_eq!(
            hex::encode(master.chain_code()),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
        assert_eq!(
            hex::encode(master.public_key_compressed()?),
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
        Ok(())
    }

    #[test]
    fn bip32_vector1_hardened_child() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let child = vector1_master()?.derive_child(ChildIndex::Hardened(0))?;
        assert_eq!(
            hex::encode(child.secret_bytes()),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
        assert_eq!(
            hex::encode(child.chain_code()),
            "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141"
        );
        Ok(())
    }

    #[test]
    fn bip32_vector1_normal_child() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path: DerivationPath = "m/0'/1".parse()?;
        let child = vector1_master()?.derive_path(&path)?;
        assert_eq!(
            hex::encode(child.secret_bytes()),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
        assert_eq!(
            hex::encode(child.public_key_compressed()?),
            "03501e454bf00751f24b1b489aa925215d66af2234e3891c3b21a52bedb3cd711c"
        );
        Ok(())
    }

    // --- Consistency ---

    #[test]
    fn derivation_is_deterministic() -> std::result::Result<(), SwapMeshError> {
        let seed = Seed::from_bytes([0x42; 64]);
        let a = derive_secp256k1_key(&seed, "m/44'/0'/0'/0/0")?;
        let b = derive_secp256k1_key(&seed, "m/44'/0'/0'/0/0")?;
        assert_eq!(a.secret_bytes(), b.secret_bytes());
        Ok(())
    }

    #[test]
    fn sibling_indices_differ() -> std::result::Result<(), SwapMeshError> {
        let seed = Seed::from_bytes([0x42; 64]);
        let a = derive_secp256k1_key(&seed, "m/44'/0'/0'/0/0")?;
        let b = derive_secp256k1_key(&seed, "m/44'/0'/0'/0/1")?;
        assert_ne!(a.secret_bytes(), b.secret_bytes());
        Ok(())
    }

    #[test]
    fn uncompressed_and_compressed_share_x() -> std::result::Result<(), SwapMeshError> {
        let seed = Seed::from_bytes([0x07; 64]);
        let key = derive_secp256k1_key(&seed, "m/44'/60'/0'/0/0")?;
        let c = key.public_key_compressed()?;
        let u = key.public_key_uncompressed()?;
        assert_eq!(u[0], 0x04);
        assert_eq!(&c[1..], &u[1..33]);
        Ok(())
    }
}
