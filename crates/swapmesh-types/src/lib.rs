//! Core shared types for the swapmesh atomic-swap coordination layer.
//!
//! Every enumeration that the registry, the order book and the wallet
//! derivation dispatch on lives here, together with the workspace-wide
//! error type. String names only appear at configuration boundaries and
//! are parsed into these enums with [`FromStr`].

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Coin
// ---------------------------------------------------------------------------

/// A supported asset ticker.
///
/// Serialized as the upper-case ticker (`"BTC"`, `"ETH"`, ...).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coin {
    Btc,
    Eth,
    Bnb,
    Matic,
    Ghost,
    Next,
}

impl Coin {
    /// All supported coins, in declaration order.
    pub const ALL: [Coin; 6] = [
        Coin::Btc,
        Coin::Eth,
        Coin::Bnb,
        Coin::Matic,
        Coin::Ghost,
        Coin::Next,
    ];

    /// Upper-case ticker symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::Bnb => "BNB",
            Self::Matic => "MATIC",
            Self::Ghost => "GHOST",
            Self::Next => "NEXT",
        }
    }

    /// Whether the coin lives on an account-model (EVM) chain.
    pub fn is_evm(&self) -> bool {
        matches!(self, Self::Eth | Self::Bnb | Self::Matic)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Coin {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Coin::ALL
            .iter()
            .copied()
            .find(|coin| coin.symbol() == upper)
            .ok_or_else(|| SwapMeshError::UnsupportedCoin {
                symbol: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Which family of chains the application talks to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(SwapMeshError::ConfigError {
                reason: format!("unknown network '{other}', expected mainnet or testnet"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceName
// ---------------------------------------------------------------------------

/// Capability names under which services register with the app.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Auth,
    Room,
    Orders,
}

impl ServiceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Room => "room",
            Self::Orders => "orders",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Self::Auth),
            "room" => Ok(Self::Room),
            "orders" => Ok(Self::Orders),
            other => Err(SwapMeshError::ConfigError {
                reason: format!("unknown service name '{other}'"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvKey
// ---------------------------------------------------------------------------

/// Names of the environment collaborators a `SwapApp` accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EnvKey {
    #[serde(rename = "storage")]
    Storage,
    #[serde(rename = "sessionStorage")]
    SessionStorage,
    #[serde(rename = "web3")]
    Web3,
    #[serde(rename = "getWeb3")]
    GetWeb3,
    #[serde(rename = "bitcoin")]
    Bitcoin,
    #[serde(rename = "ghost")]
    Ghost,
    #[serde(rename = "next")]
    Next,
    #[serde(rename = "metamask")]
    Metamask,
    #[serde(rename = "isTest")]
    IsTest,
}

impl EnvKey {
    pub const ALL: [EnvKey; 9] = [
        EnvKey::Storage,
        EnvKey::SessionStorage,
        EnvKey::Web3,
        EnvKey::GetWeb3,
        EnvKey::Bitcoin,
        EnvKey::Ghost,
        EnvKey::Next,
        EnvKey::Metamask,
        EnvKey::IsTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::SessionStorage => "sessionStorage",
            Self::Web3 => "web3",
            Self::GetWeb3 => "getWeb3",
            Self::Bitcoin => "bitcoin",
            Self::Ghost => "ghost",
            Self::Next => "next",
            Self::Metamask => "metamask",
            Self::IsTest => "isTest",
        }
    }
}

impl fmt::Display for EnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvKey {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EnvKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = EnvKey::ALL.iter().map(|k| k.as_str()).collect();
                SwapMeshError::ConfigError {
                    reason: format!("unknown env key '{s}', only {} available", allowed.join(",")),
                }
            })
    }
}

// ---------------------------------------------------------------------------
// PairName
// ---------------------------------------------------------------------------

/// Key of a negotiation flow: the coin given up and the coin received.
///
/// Displayed as `"{FROM}2{TO}"`, e.g. `BTC2ETH`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PairName {
    pub from: Coin,
    pub to: Coin,
}

impl PairName {
    pub fn new(from: Coin, to: Coin) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for PairName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}2{}", self.from, self.to)
    }
}

impl FromStr for PairName {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (from, to) = s.split_once('2').ok_or_else(|| SwapMeshError::ConfigError {
            reason: format!("pair name '{s}' must look like FROM2TO"),
        })?;
        Ok(Self {
            from: from.parse()?,
            to: to.parse()?,
        })
    }
}

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Order identifier: SHA3-256(owner || created_at || nonce).
///
/// Travels over the wire as a 64-character hex string.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId([u8; 32]);

impl OrderId {
    /// The fixed byte length of an order ID.
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for OrderId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for OrderId {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| SwapMeshError::InvalidOrder {
            reason: "invalid hex encoding for order id".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(SwapMeshError::InvalidOrder {
                reason: format!("expected 32 bytes for order id, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl TryFrom<String> for OrderId {
    type Error = SwapMeshError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A strictly positive decimal amount, kept in its textual form so no
/// precision is lost between chains with different decimals.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(String);

impl Amount {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Amount {
    type Err = SwapMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |why: &str| SwapMeshError::InvalidOrder {
            reason: format!("invalid amount '{s}': {why}"),
        };

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("empty"));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(invalid("not a decimal number"));
        }
        if !s.bytes().any(|b| (b'1'..=b'9').contains(&b)) {
            return Err(invalid("must be greater than zero"));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Amount {
    type Error = SwapMeshError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

// ---------------------------------------------------------------------------
// SwapId
// ---------------------------------------------------------------------------

/// Identifier of an in-flight swap session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SwapId(String);

impl SwapId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SwapId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// SwapMeshError
// ---------------------------------------------------------------------------

/// Central error type for the swapmesh workspace.
///
/// All crates convert their internal failures into one of these
/// variants, each carrying a human-readable reason.
#[derive(Debug, Error)]
pub enum SwapMeshError {
    /// A configuration value, env key or registration is invalid.
    #[error("config error: {reason}")]
    ConfigError {
        /// Description of the configuration problem.
        reason: String,
    },

    /// A networking or transport operation failed.
    #[error("network error: {reason}")]
    NetworkError {
        /// Description of the network failure.
        reason: String,
    },

    /// A message could not be encoded or decoded.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Description of the protocol failure.
        reason: String,
    },

    /// The mnemonic phrase is not a valid BIP39 English phrase.
    #[error("invalid mnemonic: {reason}")]
    InvalidMnemonic {
        /// Description of why the phrase was rejected.
        reason: String,
    },

    /// The coin ticker is not one this system knows.
    #[error("unsupported coin: {symbol}")]
    UnsupportedCoin {
        /// The offending ticker as supplied.
        symbol: String,
    },

    /// A key-derivation or hashing step failed.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Description of the cryptographic failure.
        reason: String,
    },

    /// An environment storage collaborator failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Description of the storage failure.
        reason: String,
    },

    /// An order is malformed or an operation on it was refused.
    #[error("invalid order: {reason}")]
    InvalidOrder {
        /// Description of the order problem.
        reason: String,
    },

    /// The application registry is not in the state the call requires.
    #[error("registry error: {reason}")]
    RegistryError {
        /// Description of the registry state problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`SwapMeshError`].
pub type Result<T> = std::result::Result<T, SwapMeshError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
