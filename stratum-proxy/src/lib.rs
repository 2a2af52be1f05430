pub mod config;
pub mod control_client;
pub mod errors;
pub mod hashrate;
pub mod protocol;
pub mod session;

pub use config::ProxyConfig;
pub use control_client::ControlClient;
pub use errors::{DialectError, ProxyError};
