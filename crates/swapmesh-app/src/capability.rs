//! Plug-in contracts hosted by a [`SwapApp`].
//!
//! Services, per-coin swap implementations, pair flows and live swap
//! sessions are supplied by the embedding application. The registry only
//! relies on the small surface defined here.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use swapmesh_types::{Coin, PairName, Result, ServiceName, SwapId, SwapMeshError};

use crate::app::SwapApp;

/// Services keyed by the name they report.
pub type ServiceMap = HashMap<ServiceName, Arc<dyn Service>>;

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// A long-lived service registered under a [`ServiceName`].
///
/// The registry drives three passes over all services, in order:
/// [`attach_to_app`](Service::attach_to_app) as each one is inserted,
/// then [`wait_relations_resolve`](Service::wait_relations_resolve) with
/// the complete map, then [`try_init_service`](Service::try_init_service).
pub trait Service: Send + Sync + 'static {
    fn service_name(&self) -> ServiceName;

    /// Receives a back-reference to the owning app.
    fn attach_to_app(&self, _app: Weak<SwapApp>) {}

    /// Looks up sibling services. Called once every service is attached.
    fn wait_relations_resolve(&self, _services: &ServiceMap) -> Result<()> {
        Ok(())
    }

    fn try_init_service(&self) -> Result<()> {
        Ok(())
    }

    /// Concrete type access for [`resolve_service`].
    fn as_any(&self) -> &dyn Any;
}

/// Finds the service registered as `name` and downcasts it to `T`.
///
/// # Errors
///
/// `RegistryError` if nothing is registered under `name` or the
/// registered service is not a `T`.
pub fn resolve_service<T: Service>(services: &ServiceMap, name: ServiceName) -> Result<&T> {
    let service = services.get(&name).ok_or_else(|| SwapMeshError::RegistryError {
        reason: format!("service '{name}' is not registered"),
    })?;
    service
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| SwapMeshError::RegistryError {
            reason: format!("service '{name}' has an unexpected type"),
        })
}

// ---------------------------------------------------------------------------
// Swaps and flows
// ---------------------------------------------------------------------------

/// Per-coin swap implementation.
pub trait SwapCapability: Send + Sync + 'static {
    fn swap_name(&self) -> Coin;

    /// Hook run each time the swap is registered with `app`.
    fn init_swap(&self, _app: &SwapApp) -> Result<()> {
        Ok(())
    }
}

/// Factory for the negotiation flow of one coin pair.
pub trait FlowFactory: Send + Sync + 'static {
    fn from_coin(&self) -> Coin;

    fn to_coin(&self) -> Coin;

    fn pair_name(&self) -> PairName {
        PairName::new(self.from_coin(), self.to_coin())
    }
}

// ---------------------------------------------------------------------------
// SwapSession
// ---------------------------------------------------------------------------

/// A swap in progress, attached to the app by the flow that runs it.
pub trait SwapSession: Send + Sync + 'static {
    fn id(&self) -> SwapId;

    fn is_finished(&self) -> bool;

    /// Counterparty's address on `coin`, if known.
    fn participant_address(&self, coin: Coin) -> Option<String>;

    /// Counterparty's browser-wallet address, if they connected one.
    fn participant_metamask_address(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(ServiceName);

    impl Service for Plain {
        fn service_name(&self) -> ServiceName {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Other;

    impl Service for Other {
        fn service_name(&self) -> ServiceName {
            ServiceName::Room
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct BtcToEth;

    impl FlowFactory for BtcToEth {
        fn from_coin(&self) -> Coin {
            Coin::Btc
        }

        fn to_coin(&self) -> Coin {
            Coin::Eth
        }
    }

    #[test]
    fn resolve_service_by_type() {
        let mut services = ServiceMap::new();
        services.insert(ServiceName::Auth, Arc::new(Plain(ServiceName::Auth)));
        services.insert(ServiceName::Room, Arc::new(Other));

        assert!(resolve_service::<Plain>(&services, ServiceName::Auth).is_ok());
        assert!(matches!(
            resolve_service::<Plain>(&services, ServiceName::Room),
            Err(SwapMeshError::RegistryError { .. })
        ));
        assert!(resolve_service::<Plain>(&services, ServiceName::Orders).is_err());
    }

    #[test]
    fn pair_name_from_coins() {
        assert_eq!(BtcToEth.pair_name().to_string(), "BTC2ETH");
    }
}
