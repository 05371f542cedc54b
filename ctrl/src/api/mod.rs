//! HTTP surface: Streamable HTTP and SSE transports behind the access gate

mod server;
pub mod sse;
pub mod streamable;

pub use server::{AppState, GatewayServer, TransportSettings};
