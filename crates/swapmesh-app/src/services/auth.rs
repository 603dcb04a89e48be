//! Per-coin wallet accounts derived from one mnemonic.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, Weak};

use swapmesh_crypto::mnemonic::Mnemonic;
use swapmesh_crypto::{derive_wallet, WalletIdentity};
use swapmesh_types::{Coin, Result, ServiceName, SwapMeshError};
use zeroize::Zeroizing;

use crate::app::SwapApp;
use crate::capability::Service;

/// Registered as [`ServiceName::Auth`].
///
/// Accounts are derived during the init pass, for the network of the
/// app the service is attached to.
pub struct AuthService {
    mnemonic: Zeroizing<String>,
    coins: Vec<Coin>,
    account_index: u32,
    app: Mutex<Weak<SwapApp>>,
    accounts: Mutex<HashMap<Coin, WalletIdentity>>,
}

impl AuthService {
    /// # Errors
    ///
    /// `InvalidMnemonic` if `mnemonic` is not a valid BIP39 phrase.
    pub fn new(mnemonic: &str, coins: impl IntoIterator<Item = Coin>) -> Result<Self> {
        let mnemonic = Mnemonic::parse(mnemonic)?;
        Ok(Self {
            mnemonic: Zeroizing::new(mnemonic.as_str().to_string()),
            coins: coins.into_iter().collect(),
            account_index: 0,
            app: Mutex::new(Weak::new()),
            accounts: Mutex::new(HashMap::new()),
        })
    }

    /// Derives the account at `index` instead of the first one.
    pub fn with_account_index(mut self, index: u32) -> Self {
        self.account_index = index;
        self
    }

    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    /// The derived account for `coin`, once the service is initialized.
    pub fn account(&self, coin: Coin) -> Result<Option<WalletIdentity>> {
        Ok(self.accounts()?.get(&coin).cloned())
    }

    pub fn address(&self, coin: Coin) -> Result<Option<String>> {
        Ok(self.accounts()?.get(&coin).map(|a| a.address.clone()))
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<Coin, WalletIdentity>>> {
        self.accounts.lock().map_err(|e| SwapMeshError::RegistryError {
            reason: format!("auth accounts lock poisoned: {e}"),
        })
    }
}

impl Service for AuthService {
    fn service_name(&self) -> ServiceName {
        ServiceName::Auth
    }

    fn attach_to_app(&self, app: Weak<SwapApp>) {
        if let Ok(mut slot) = self.app.lock() {
            *slot = app;
        }
    }

    fn try_init_service(&self) -> Result<()> {
        let network = self
            .app
            .lock()
            .ok()
            .and_then(|app| app.upgrade())
            .map(|app| app.network())
            .ok_or_else(|| SwapMeshError::RegistryError {
                reason: "auth service is not attached to an app".into(),
            })?;

        let mut derived = HashMap::with_capacity(self.coins.len());
        for &coin in &self.coins {
            let account = derive_wallet(coin, network, &self.mnemonic, self.account_index, None)?;
            tracing::debug!(%coin, address = %account.address, "account derived");
            derived.insert(coin, account);
        }

        *self.accounts()? = derived;
        tracing::info!(%network, coins = self.coins.len(), "auth accounts ready");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("coins", &self.coins)
            .field("account_index", &self.account_index)
            .finish_non_exhaustive()
    }
}
