//! The swap application registry.
//!
//! A [`SwapApp`] binds one network, its environment collaborators, the
//! hosted services, per-coin swaps and per-pair flows into a single
//! context. It is always handled through an `Arc`; services keep a
//! `Weak` back-reference.
//!
//! # Construction
//!
//! ```text
//! add_env ──▶ add_services ──▶ add_swaps ──▶ add_flows ──▶ inited
//! ```
//!
//! Registering two entries under the same name keeps the last one and
//! logs a warning.
//!
//! # Thread safety
//!
//! Every collection sits behind its own `std::sync::Mutex`; each public
//! operation takes the lock once and never awaits.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use swapmesh_types::config::SwapAppConfig;
use swapmesh_types::{Coin, Network, PairName, Result, ServiceName, SwapId, SwapMeshError};

use crate::capability::{resolve_service, FlowFactory, Service, ServiceMap, SwapCapability, SwapSession};
use crate::env::{ChainRpcProvider, Env, EnvValue};
use crate::services::AuthService;

// ---------------------------------------------------------------------------
// SwapAppOptions
// ---------------------------------------------------------------------------

/// Everything needed to build a [`SwapApp`].
#[derive(Clone, Default)]
pub struct SwapAppOptions {
    pub config: SwapAppConfig,
    /// Named collaborators, see [`crate::env`].
    pub env: Vec<(String, EnvValue)>,
    pub services: Vec<Arc<dyn Service>>,
    pub swaps: Vec<Arc<dyn SwapCapability>>,
    pub flows: Vec<Arc<dyn FlowFactory>>,
}

impl fmt::Debug for SwapAppOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapAppOptions")
            .field("config", &self.config)
            .field("env", &self.env)
            .field("services", &self.services.len())
            .field("swaps", &self.swaps.len())
            .field("flows", &self.flows.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SwapApp
// ---------------------------------------------------------------------------

pub struct SwapApp {
    network: Network,
    whitelist_btc: Vec<String>,
    env: Mutex<Env>,
    services: Mutex<ServiceMap>,
    swaps: Mutex<HashMap<Coin, Arc<dyn SwapCapability>>>,
    flows: Mutex<HashMap<PairName, Arc<dyn FlowFactory>>>,
    attached: Mutex<AttachedSwaps>,
    inited: AtomicBool,
}

/// Sessions in attach order, indexed by id.
#[derive(Default)]
struct AttachedSwaps {
    order: Vec<Arc<dyn SwapSession>>,
    ids: HashSet<SwapId>,
}

impl SwapApp {
    /// Builds and initializes an app.
    ///
    /// # Errors
    ///
    /// - `ConfigError` for invalid config, env entries or flows.
    /// - Any error returned by a service's relation or init hook, or by
    ///   a swap's `init_swap`.
    pub fn new(options: &SwapAppOptions) -> Result<Arc<Self>> {
        options.config.validate()?;
        let env = Env::from_entries(&options.env, &options.config.storage_prefix)?;

        let app = Arc::new(Self {
            network: options.config.network,
            whitelist_btc: options.config.effective_whitelist_btc(),
            env: Mutex::new(env),
            services: Mutex::new(HashMap::new()),
            swaps: Mutex::new(HashMap::new()),
            flows: Mutex::new(HashMap::new()),
            attached: Mutex::new(AttachedSwaps::default()),
            inited: AtomicBool::new(false),
        });

        app.add_services(&options.services)?;
        app.add_swaps(&options.swaps)?;
        app.add_flows(&options.flows)?;
        app.inited.store(true, Ordering::Release);

        tracing::info!(
            network = %app.network,
            services = options.services.len(),
            swaps = options.swaps.len(),
            flows = options.flows.len(),
            "swap app initialized"
        );
        Ok(app)
    }

    // -- Registration -----------------------------------------------------

    fn add_services(self: &Arc<Self>, services: &[Arc<dyn Service>]) -> Result<()> {
        {
            let mut map = lock(&self.services, "services")?;
            for service in services {
                service.attach_to_app(Arc::downgrade(self));
                let name = service.service_name();
                if map.insert(name, service.clone()).is_some() {
                    tracing::warn!(%name, "duplicate service registration, keeping the last");
                }
            }
        }

        // Hooks run on a snapshot so they may call back into the app.
        let snapshot = self.services()?;
        for service in snapshot.values() {
            service.wait_relations_resolve(&snapshot)?;
        }
        for service in snapshot.values() {
            service.try_init_service()?;
        }
        Ok(())
    }

    pub(crate) fn add_swaps(&self, swaps: &[Arc<dyn SwapCapability>]) -> Result<()> {
        for swap in swaps {
            let coin = swap.swap_name();
            let replaced = lock(&self.swaps, "swaps")?.insert(coin, swap.clone());
            if replaced.is_some() {
                tracing::warn!(%coin, "duplicate swap registration, keeping the last");
            }
            swap.init_swap(self)?;
        }
        Ok(())
    }

    pub(crate) fn add_flows(&self, flows: &[Arc<dyn FlowFactory>]) -> Result<()> {
        let mut map = lock(&self.flows, "flows")?;
        for flow in flows {
            let pair = flow.pair_name();
            if pair.from == pair.to {
                return Err(SwapMeshError::ConfigError {
                    reason: format!("flow {pair} trades a coin for itself"),
                });
            }
            if map.insert(pair, flow.clone()).is_some() {
                tracing::warn!(%pair, "duplicate flow registration, keeping the last");
            }
        }
        Ok(())
    }

    pub(crate) fn set_web3_provider(&self, provider: Arc<dyn ChainRpcProvider>) -> Result<()> {
        lock(&self.env, "env")?.set_web3(provider);
        Ok(())
    }

    // -- Sessions ---------------------------------------------------------

    /// Attaches a running swap. Returns `false`, leaving the existing
    /// session in place, if one with the same id is already attached.
    pub fn attach_swap(&self, session: Arc<dyn SwapSession>) -> Result<bool> {
        let id = session.id();
        let mut attached = lock(&self.attached, "attached swaps")?;
        if !attached.ids.insert(id.clone()) {
            return Ok(false);
        }
        attached.order.push(session);
        tracing::debug!(%id, "swap attached");
        Ok(true)
    }

    /// Attached sessions that have not finished, in attach order.
    pub fn active_swaps(&self) -> Result<Vec<Arc<dyn SwapSession>>> {
        let attached = lock(&self.attached, "attached swaps")?;
        Ok(attached
            .order
            .iter()
            .filter(|s| !s.is_finished())
            .cloned()
            .collect())
    }

    /// Unfinished sessions whose counterparty uses `address` on `coin`.
    /// Addresses compare case-insensitively.
    pub fn swaps_by_address(&self, coin: Coin, address: &str) -> Result<Vec<Arc<dyn SwapSession>>> {
        Ok(self
            .active_swaps()?
            .into_iter()
            .filter(|s| {
                s.participant_address(coin)
                    .is_some_and(|a| a.eq_ignore_ascii_case(address))
            })
            .collect())
    }

    /// The counterparty's browser-wallet address, or their ETH address.
    pub fn participant_eth_address(&self, session: &dyn SwapSession) -> Option<String> {
        session
            .participant_metamask_address()
            .or_else(|| session.participant_address(Coin::Eth))
    }

    /// This node's ETH address: the connected browser wallet's when it
    /// reports one, otherwise the ETH account of the auth service.
    ///
    /// # Errors
    ///
    /// `RegistryError` if the wallet fallback is needed and no
    /// [`AuthService`] is registered.
    pub fn my_eth_address(&self) -> Result<Option<String>> {
        let metamask = lock(&self.env, "env")?.metamask();
        if let Some(address) = metamask.filter(|w| w.is_connected()).and_then(|w| w.address()) {
            return Ok(Some(address));
        }

        let services = lock(&self.services, "services")?;
        let auth = resolve_service::<AuthService>(&services, ServiceName::Auth)?;
        auth.address(Coin::Eth)
    }

    // -- Lookups ----------------------------------------------------------

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn is_mainnet(&self) -> bool {
        self.network == Network::Mainnet
    }

    pub fn is_testnet(&self) -> bool {
        self.network == Network::Testnet
    }

    pub fn is_inited(&self) -> bool {
        self.inited.load(Ordering::Acquire)
    }

    /// Exact match against the BTC whitelist.
    pub fn is_whitelist_btc(&self, address: &str) -> bool {
        self.whitelist_btc.iter().any(|a| a == address)
    }

    pub fn whitelist_btc(&self) -> &[String] {
        &self.whitelist_btc
    }

    pub fn service(&self, name: ServiceName) -> Result<Option<Arc<dyn Service>>> {
        Ok(lock(&self.services, "services")?.get(&name).cloned())
    }

    /// Snapshot of all registered services.
    pub fn services(&self) -> Result<ServiceMap> {
        Ok(lock(&self.services, "services")?.clone())
    }

    pub fn swap(&self, coin: Coin) -> Result<Option<Arc<dyn SwapCapability>>> {
        Ok(lock(&self.swaps, "swaps")?.get(&coin).cloned())
    }

    pub fn flow(&self, pair: PairName) -> Result<Option<Arc<dyn FlowFactory>>> {
        Ok(lock(&self.flows, "flows")?.get(&pair).cloned())
    }

    /// Registered pairs, sorted.
    pub fn flow_pairs(&self) -> Result<Vec<PairName>> {
        let mut pairs: Vec<PairName> = lock(&self.flows, "flows")?.keys().copied().collect();
        pairs.sort();
        Ok(pairs)
    }

    /// Snapshot of the environment.
    pub fn env(&self) -> Result<Env> {
        Ok(lock(&self.env, "env")?.clone())
    }
}

impl fmt::Debug for SwapApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut services: Vec<ServiceName> = self
            .services
            .lock()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        services.sort();
        f.debug_struct("SwapApp")
            .field("network", &self.network)
            .field("services", &services)
            .field("inited", &self.is_inited())
            .finish_non_exhaustive()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|e| SwapMeshError::RegistryError {
        reason: format!("{what} lock poisoned: {e}"),
    })
}
