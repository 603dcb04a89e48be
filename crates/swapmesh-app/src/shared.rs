//! The shared app slot.
//!
//! Library code takes an explicit `Arc<SwapApp>`. The composition root
//! may additionally park one app in a [`SharedApp`] so late-bound
//! collaborators (a web3 provider connected after startup) can be
//! installed, and so components started early can
//! [`wait_ready`](SharedApp::wait_ready) instead of polling.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use swapmesh_types::{Result, SwapMeshError};
use tokio::sync::watch;

use crate::app::{SwapApp, SwapAppOptions};
use crate::env::ChainRpcProvider;

struct SharedState {
    app: Arc<SwapApp>,
    options: SwapAppOptions,
}

/// A slot holding at most one [`SwapApp`].
pub struct SharedApp {
    state: Mutex<Option<SharedState>>,
    ready: watch::Sender<Option<Arc<SwapApp>>>,
}

impl Default for SharedApp {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedApp {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(None);
        Self {
            state: Mutex::new(None),
            ready,
        }
    }

    /// Process-wide slot. Only the outermost binary should use it.
    pub fn global() -> &'static SharedApp {
        static GLOBAL: OnceLock<SharedApp> = OnceLock::new();
        GLOBAL.get_or_init(SharedApp::new)
    }

    /// Builds an app from `options` and stores it.
    ///
    /// The slot is not locked while the app's hooks run, so a service or
    /// swap may call [`shared`](Self::shared) from its hooks. It sees the
    /// previous app, if any.
    ///
    /// # Errors
    ///
    /// - `RegistryError` if an app is already set up and `force_fresh`
    ///   is false.
    /// - Any construction error from [`SwapApp::new`]; the slot is left
    ///   unchanged.
    pub fn setup(&self, options: SwapAppOptions, force_fresh: bool) -> Result<Arc<SwapApp>> {
        if self.lock()?.is_some() && !force_fresh {
            return Err(already_set_up());
        }

        let app = SwapApp::new(&options)?;

        let mut state = self.lock()?;
        // Another caller may have finished setup while the hooks ran.
        if state.is_some() && !force_fresh {
            return Err(already_set_up());
        }
        if state.replace(SharedState {
            app: app.clone(),
            options,
        })
        .is_some()
        {
            tracing::info!("shared swap app replaced");
        }
        self.ready.send_replace(Some(app.clone()));
        Ok(app)
    }

    /// Builds an app, storing it in the slot when `make_shared` is set.
    pub fn init(&self, options: SwapAppOptions, make_shared: bool) -> Result<Arc<SwapApp>> {
        if make_shared {
            self.setup(options, false)
        } else {
            SwapApp::new(&options)
        }
    }

    /// # Errors
    ///
    /// `RegistryError` if nothing has been set up.
    pub fn shared(&self) -> Result<Arc<SwapApp>> {
        self.lock()?
            .as_ref()
            .map(|s| s.app.clone())
            .ok_or_else(not_set_up)
    }

    pub fn is_set_up(&self) -> bool {
        self.ready.borrow().is_some()
    }

    /// Installs `provider` as the shared app's `web3` collaborator and
    /// registers its swaps and flows again. The hooks run with the slot
    /// unlocked.
    ///
    /// # Errors
    ///
    /// `RegistryError` if nothing has been set up, or any error from
    /// swap or flow registration.
    pub fn set_web3_provider(&self, provider: Arc<dyn ChainRpcProvider>) -> Result<()> {
        let (app, options) = {
            let state = self.lock()?;
            let state = state.as_ref().ok_or_else(not_set_up)?;
            (state.app.clone(), state.options.clone())
        };

        tracing::debug!(endpoint = %provider.endpoint(), "installing web3 provider");
        app.set_web3_provider(provider)?;
        app.add_swaps(&options.swaps)?;
        app.add_flows(&options.flows)
    }

    /// Resolves once an app is set up.
    pub async fn wait_ready(&self) -> Result<Arc<SwapApp>> {
        let mut rx = self.ready.subscribe();
        let ready = rx.wait_for(Option::is_some).await.map_err(|_| not_set_up())?;
        ready.clone().ok_or_else(not_set_up)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SharedState>>> {
        self.state.lock().map_err(|e| SwapMeshError::RegistryError {
            reason: format!("shared app lock poisoned: {e}"),
        })
    }
}

impl std::fmt::Debug for SharedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedApp")
            .field("set_up", &self.is_set_up())
            .finish()
    }
}

fn already_set_up() -> SwapMeshError {
    SwapMeshError::RegistryError {
        reason: "shared swap app is already set up".into(),
    }
}

fn not_set_up() -> SwapMeshError {
    SwapMeshError::RegistryError {
        reason: "shared swap app is not set up".into(),
    }
}
