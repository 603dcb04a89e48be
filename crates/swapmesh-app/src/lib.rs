//! Swap application registry.
//!
//! A [`SwapApp`] is the addressable context a swap front end works
//! against: one network, its environment collaborators, services keyed
//! by [`ServiceName`](swapmesh_types::ServiceName), per-coin swaps,
//! per-pair flows and the sessions currently running.
//!
//! - [`capability`]: traits implemented by pluggable parts
//! - [`env`]: environment collaborators and storage adapters
//! - [`app`]: the registry itself
//! - [`shared`]: the process-level slot and readiness signal
//! - [`services`]: auth, room and orders services

pub mod app;
pub mod capability;
pub mod env;
pub mod services;
pub mod shared;

pub use app::{SwapApp, SwapAppOptions};
pub use capability::{resolve_service, FlowFactory, Service, ServiceMap, SwapCapability, SwapSession};
pub use env::{ChainRpcProvider, Env, EnvValue, ExternalWallet, KeyValueStorage, MemoryStorage, PrefixedStorage};
pub use services::{AuthService, OrdersService, RoomService};
pub use shared::SharedApp;
