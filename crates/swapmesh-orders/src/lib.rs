//! Decentralized order book.
//!
//! Trade intents are kept in a local [`OrderBook`] and replicated to
//! other peers over a gossip topic of the peer overlay. Each node's view
//! is eventually consistent; only an order's owner may withdraw it.
//!
//! - [`order`]: order records and id derivation
//! - [`book`]: the synchronous store
//! - [`wire`]: JSON gossip messages
//! - [`service`]: the actor that owns the book and talks to the overlay
//! - [`config`]: service settings and topic naming

pub mod book;
pub mod config;
pub mod order;
pub mod service;
pub mod wire;

pub use book::OrderBook;
pub use config::{orders_topic, OrdersConfig};
pub use order::{Order, OrderDraft, OrderStatus};
pub use service::{OrderBookHandle, OrderBookService};
pub use wire::{OrderMessage, WireOrder};
