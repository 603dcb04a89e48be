//! The order book as an app service.

use std::any::Any;
use std::sync::{Mutex, MutexGuard, Weak};

use swapmesh_network::PeerOverlay;
use swapmesh_orders::{OrderBookHandle, OrderBookService, OrdersConfig};
use swapmesh_types::{Result, ServiceName, SwapMeshError};

use crate::app::SwapApp;
use crate::capability::{resolve_service, Service, ServiceMap};
use crate::services::room::RoomService;

/// Registered as [`ServiceName::Orders`].
///
/// Takes the overlay from the [`RoomService`] during the relations pass
/// and starts the order book during the init pass. Initialization needs
/// a tokio runtime.
pub struct OrdersService {
    config: OrdersConfig,
    app: Mutex<Weak<SwapApp>>,
    overlay: Mutex<Option<PeerOverlay>>,
    handle: Mutex<Option<OrderBookHandle>>,
}

impl OrdersService {
    pub fn new(config: OrdersConfig) -> Self {
        Self {
            config,
            app: Mutex::new(Weak::new()),
            overlay: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// The running order book.
    ///
    /// # Errors
    ///
    /// `RegistryError` before the service is initialized or after
    /// [`stop`](Self::stop).
    pub fn orders(&self) -> Result<OrderBookHandle> {
        lock(&self.handle)?.clone().ok_or_else(|| SwapMeshError::RegistryError {
            reason: "orders service is not running".into(),
        })
    }

    /// Stops the order book. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let handle = lock(&self.handle)?.take();
        match handle {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }
}

impl Default for OrdersService {
    fn default() -> Self {
        Self::new(OrdersConfig::default())
    }
}

impl Service for OrdersService {
    fn service_name(&self) -> ServiceName {
        ServiceName::Orders
    }

    fn attach_to_app(&self, app: Weak<SwapApp>) {
        if let Ok(mut slot) = self.app.lock() {
            *slot = app;
        }
    }

    fn wait_relations_resolve(&self, services: &ServiceMap) -> Result<()> {
        let room = resolve_service::<RoomService>(services, ServiceName::Room)?;
        *lock(&self.overlay)? = Some(room.overlay().clone());
        Ok(())
    }

    fn try_init_service(&self) -> Result<()> {
        let mut handle = lock(&self.handle)?;
        if handle.is_some() {
            tracing::debug!("order book already running");
            return Ok(());
        }

        let network = lock(&self.app)?
            .upgrade()
            .map(|app| app.network())
            .ok_or_else(|| SwapMeshError::RegistryError {
                reason: "orders service is not attached to an app".into(),
            })?;
        let overlay = lock(&self.overlay)?.clone().ok_or_else(|| SwapMeshError::RegistryError {
            reason: "orders service has no room to publish in".into(),
        })?;
        tokio::runtime::Handle::try_current().map_err(|e| SwapMeshError::RegistryError {
            reason: format!("orders service needs a tokio runtime: {e}"),
        })?;

        *handle = Some(OrderBookService::spawn(overlay, network, self.config.clone())?);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for OrdersService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let running = self.handle.lock().map(|h| h.is_some()).unwrap_or(false);
        f.debug_struct("OrdersService")
            .field("config", &self.config)
            .field("running", &running)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| SwapMeshError::RegistryError {
        reason: format!("orders service lock poisoned: {e}"),
    })
}
