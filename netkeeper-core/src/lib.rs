pub mod backup;
pub mod clock;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod models;
pub mod sanitize;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod vault;

pub use error::{ErrorKind, KeeperError, Result};
