pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod mcp;
pub mod metrics;
pub mod security;

pub use config::Config;
pub use error::{Error, Result};
