//! Deterministic multi-coin wallet derivation for swapmesh.
//!
//! This crate is the only place in the workspace that touches key
//! material. It is pure: no I/O, no global state.
//!
//! # Modules
//!
//! - [`mnemonic`]: BIP39 canonicalization, validation and seed derivation
//! - [`hd_derive`]: BIP32 secp256k1 hierarchical key derivation
//! - [`hash`]: SHA-256 / RIPEMD-160 / Keccak-256 helpers
//! - [`address`]: base58check P2PKH, WIF and EIP-55 encodings
//! - [`wallet`]: per-coin dispatch producing a [`wallet::WalletIdentity`]

pub mod address;
pub mod hash;
pub mod hd_derive;
pub mod mnemonic;
pub mod wallet;

pub use wallet::{derive_wallet, WalletIdentity};
