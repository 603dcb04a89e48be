//! Per-coin wallet derivation.
//!
//! [`derive_wallet`] turns a mnemonic into the key material and address
//! one coin needs on one network. The coin decides the BIP44 path
//! template and the encoding:
//!
//! | Coin            | Path                    | Address             | Secret     |
//! |-----------------|-------------------------|---------------------|------------|
//! | BTC             | `m/44'/0'/0'/0/{i}`     | base58check P2PKH   | WIF        |
//! | GHOST           | `m/44'/0'/0'/0/{i}`     | base58check P2PKH   | WIF        |
//! | NEXT            | `m/44'/707'/0'/0/{i}`   | base58check P2PKH   | WIF        |
//! | ETH, BNB, MATIC | `m/44'/60'/0'/0/{i}`    | EIP-55 hex          | `0x` hex   |

use std::fmt;

use swapmesh_types::{Coin, Network, Result};
use zeroize::Zeroize;

use crate::address::{eth_address, p2pkh_address, private_key_to_wif};
use crate::hd_derive::{DerivationPath, ExtendedPrivateKey};
use crate::mnemonic::{mnemonic_to_seed, Mnemonic};

// ---------------------------------------------------------------------------
// Coin parameters
// ---------------------------------------------------------------------------

/// How addresses and secrets are encoded for a coin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// Base58check P2PKH address with compressed-key WIF secret.
    P2pkh { pubkey_version: u8, wif_version: u8 },
    /// EIP-55 address with raw hex secret.
    Evm,
}

/// Derivation parameters for one coin on one network.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CoinParams {
    pub coin: Coin,
    /// Path up to, but excluding, the address index.
    pub path_prefix: &'static str,
    pub kind: AddressKind,
}

impl CoinParams {
    /// Default path for the given address index.
    pub fn default_path(&self, index: u32) -> String {
        format!("{}/{index}", self.path_prefix)
    }
}

/// Looks up the derivation parameters for `coin` on `network`.
pub fn coin_params(coin: Coin, network: Network) -> CoinParams {
    let mainnet = network == Network::Mainnet;
    let p2pkh = |main: (u8, u8), test: (u8, u8)| {
        let (pubkey_version, wif_version) = if mainnet { main } else { test };
        AddressKind::P2pkh {
            pubkey_version,
            wif_version,
        }
    };

    match coin {
        Coin::Btc => CoinParams {
            coin,
            path_prefix: "m/44'/0'/0'/0",
            kind: p2pkh((0x00, 0x80), (0x6f, 0xef)),
        },
        Coin::Ghost => CoinParams {
            coin,
            path_prefix: "m/44'/0'/0'/0",
            kind: p2pkh((0x26, 0xa6), (0x4b, 0x2e)),
        },
        Coin::Next => CoinParams {
            coin,
            path_prefix: "m/44'/707'/0'/0",
            kind: p2pkh((0x4b, 0x80), (0x6f, 0xef)),
        },
        Coin::Eth | Coin::Bnb | Coin::Matic => CoinParams {
            coin,
            path_prefix: "m/44'/60'/0'/0",
            kind: AddressKind::Evm,
        },
    }
}

// ---------------------------------------------------------------------------
// WalletIdentity
// ---------------------------------------------------------------------------

/// Key material and address for one coin.
///
/// `mnemonic` and `private_key` are wiped when the value is dropped.
#[derive(Clone)]
pub struct WalletIdentity {
    pub coin: Coin,
    /// Canonical form of the mnemonic the identity was derived from.
    pub mnemonic: String,
    pub derivation_path: String,
    pub address: String,
    /// Compressed SEC1 hex for UTXO coins; `0x` + 64-byte X||Y for EVM coins.
    pub public_key: String,
    /// WIF for UTXO coins; `0x`-prefixed hex for EVM coins.
    pub private_key: String,
}

impl Drop for WalletIdentity {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
        self.private_key.zeroize();
    }
}

impl fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("coin", &self.coin)
            .field("derivation_path", &self.derivation_path)
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derives the wallet for `coin` from `mnemonic`.
///
/// `path_override`, when given, replaces the coin's default
/// `…/{account_index}` path entirely.
///
/// # Errors
///
/// - `InvalidMnemonic` if the canonical phrase fails BIP39 validation.
/// - `ConfigError` if `path_override` is malformed.
pub fn derive_wallet(
    coin: Coin,
    network: Network,
    mnemonic: &str,
    account_index: u32,
    path_override: Option<&str>,
) -> Result<WalletIdentity> {
    let mnemonic = Mnemonic::parse(mnemonic)?;
    let params = coin_params(coin, network);

    let path: DerivationPath = match path_override {
        Some(p) => p.parse()?,
        None => params.default_path(account_index).parse()?,
    };

    let seed = mnemonic_to_seed(mnemonic.as_str(), "")?;
    let key = ExtendedPrivateKey::from_seed(&seed)?.derive_path(&path)?;

    let (address, public_key, private_key) = match params.kind {
        AddressKind::P2pkh {
            pubkey_version,
            wif_version,
        } => {
            let public = key.public_key_compressed()?;
            (
                p2pkh_address(&public, pubkey_version),
                hex::encode(public),
                private_key_to_wif(key.secret_bytes(), wif_version),
            )
        }
        AddressKind::Evm => {
            let public = key.public_key_uncompressed()?;
            (
                eth_address(&public),
                format!("0x{}", hex::encode(&public[1..])),
                format!("0x{}", hex::encode(key.secret_bytes())),
            )
        }
    };

    Ok(WalletIdentity {
        coin,
        mnemonic: mnemonic.as_str().to_string(),
        derivation_path: path.to_string(),
        address,
        public_key,
        private_key,
    })
}
