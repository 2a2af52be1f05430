//! Order State Machine (§4.2).

pub mod code;
pub mod error;
pub mod state_machine;

pub use state_machine::{AdminAction, NewOrder, Order, OrderStatus, PoolTarget};
