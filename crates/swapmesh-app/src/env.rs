//! Environment collaborators handed to a [`SwapApp`](crate::SwapApp).
//!
//! Options name each collaborator with a string. Names are parsed into
//! [`EnvKey`] and the value must be of the kind the key expects:
//!
//! | Key | Kind |
//! |---|---|
//! | `storage`, `sessionStorage` | [`EnvValue::Storage`] |
//! | `web3`, `getWeb3`, `bitcoin`, `ghost`, `next` | [`EnvValue::ChainRpc`] |
//! | `metamask` | [`EnvValue::Wallet`] |
//! | `isTest` | [`EnvValue::Flag`] |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use swapmesh_types::{EnvKey, Result, SwapMeshError};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// String key/value store, e.g. the embedding app's local storage.
pub trait KeyValueStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Blockchain RPC client. The registry only needs to describe it.
pub trait ChainRpcProvider: Send + Sync + 'static {
    /// Endpoint URL or other human-readable description.
    fn endpoint(&self) -> String;
}

/// Browser-style external wallet such as MetaMask.
pub trait ExternalWallet: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    fn address(&self) -> Option<String>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process [`KeyValueStorage`], used when no storage is supplied.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|e| SwapMeshError::StorageError {
            reason: format!("memory storage lock poisoned: {e}"),
        })
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PrefixedStorage
// ---------------------------------------------------------------------------

/// Namespaces every key of an inner store with a fixed prefix.
#[derive(Clone)]
pub struct PrefixedStorage {
    prefix: String,
    inner: Arc<dyn KeyValueStorage>,
}

impl PrefixedStorage {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl fmt::Debug for PrefixedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixedStorage")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl KeyValueStorage for PrefixedStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(&self.key(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(&self.key(key), value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(&self.key(key))
    }
}

// ---------------------------------------------------------------------------
// EnvValue
// ---------------------------------------------------------------------------

/// A collaborator as supplied in the app options.
#[derive(Clone)]
pub enum EnvValue {
    Storage(Arc<dyn KeyValueStorage>),
    ChainRpc(Arc<dyn ChainRpcProvider>),
    Wallet(Arc<dyn ExternalWallet>),
    Flag(bool),
}

impl EnvValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::ChainRpc(_) => "chain rpc provider",
            Self::Wallet(_) => "external wallet",
            Self::Flag(_) => "flag",
        }
    }

    fn fits(&self, key: EnvKey) -> bool {
        match key {
            EnvKey::Storage | EnvKey::SessionStorage => matches!(self, Self::Storage(_)),
            EnvKey::Web3 | EnvKey::GetWeb3 | EnvKey::Bitcoin | EnvKey::Ghost | EnvKey::Next => {
                matches!(self, Self::ChainRpc(_))
            }
            EnvKey::Metamask => matches!(self, Self::Wallet(_)),
            EnvKey::IsTest => matches!(self, Self::Flag(_)),
        }
    }
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// Validated environment of one app.
#[derive(Clone)]
pub struct Env {
    storage: PrefixedStorage,
    session_storage: Option<Arc<dyn KeyValueStorage>>,
    providers: HashMap<EnvKey, Arc<dyn ChainRpcProvider>>,
    metamask: Option<Arc<dyn ExternalWallet>>,
    is_test: bool,
}

impl Env {
    /// Validates `entries` and builds the environment.
    ///
    /// The `storage` entry, or a fresh [`MemoryStorage`], is wrapped in
    /// a [`PrefixedStorage`] with `storage_prefix`. A repeated key
    /// replaces the earlier entry.
    ///
    /// # Errors
    ///
    /// `ConfigError` for a name outside [`EnvKey`] or a value of the
    /// wrong kind for its key.
    pub fn from_entries(entries: &[(String, EnvValue)], storage_prefix: &str) -> Result<Self> {
        let mut storage: Option<Arc<dyn KeyValueStorage>> = None;
        let mut env = Self {
            storage: PrefixedStorage::new(storage_prefix, Arc::new(MemoryStorage::new())),
            session_storage: None,
            providers: HashMap::new(),
            metamask: None,
            is_test: false,
        };

        for (name, value) in entries {
            let key: EnvKey = name.parse()?;
            if !value.fits(key) {
                return Err(SwapMeshError::ConfigError {
                    reason: format!("env key '{key}' cannot hold a {}", value.kind()),
                });
            }

            match (key, value.clone()) {
                (EnvKey::Storage, EnvValue::Storage(s)) => storage = Some(s),
                (EnvKey::SessionStorage, EnvValue::Storage(s)) => env.session_storage = Some(s),
                (EnvKey::Metamask, EnvValue::Wallet(w)) => env.metamask = Some(w),
                (EnvKey::IsTest, EnvValue::Flag(flag)) => env.is_test = flag,
                (key, EnvValue::ChainRpc(p)) => {
                    env.providers.insert(key, p);
                }
                _ => {}
            }
        }

        if let Some(inner) = storage {
            env.storage = PrefixedStorage::new(storage_prefix, inner);
        }
        Ok(env)
    }

    /// The app's namespaced storage.
    pub fn storage(&self) -> &PrefixedStorage {
        &self.storage
    }

    pub fn session_storage(&self) -> Option<Arc<dyn KeyValueStorage>> {
        self.session_storage.clone()
    }

    /// Provider registered under `key`, if any.
    pub fn provider(&self, key: EnvKey) -> Option<Arc<dyn ChainRpcProvider>> {
        self.providers.get(&key).cloned()
    }

    /// The EVM provider accessor: the `getWeb3` provider when supplied,
    /// otherwise the `web3` provider.
    pub fn web3(&self) -> Option<Arc<dyn ChainRpcProvider>> {
        self.provider(EnvKey::GetWeb3)
            .or_else(|| self.provider(EnvKey::Web3))
    }

    pub fn metamask(&self) -> Option<Arc<dyn ExternalWallet>> {
        self.metamask.clone()
    }

    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub(crate) fn set_web3(&mut self, provider: Arc<dyn ChainRpcProvider>) {
        self.providers.insert(EnvKey::Web3, provider);
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.providers.keys().map(|k| k.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("Env")
            .field("storage", &self.storage)
            .field("session_storage", &self.session_storage.is_some())
            .field("providers", &providers)
            .field("metamask", &self.metamask.is_some())
            .field("is_test", &self.is_test)
            .finish()
    }
}
