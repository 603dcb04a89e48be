//! Services hosted by the swap app.

pub mod auth;
pub mod orders;
pub mod room;

pub use auth::AuthService;
pub use orders::OrdersService;
pub use room::RoomService;
