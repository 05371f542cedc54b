//! Access gate: IP allowlist, origin check, rate limiting, transport shape

pub mod allowlist;
pub mod gate;
pub mod middleware;
pub mod rate_limit;
pub mod store;

pub use allowlist::{AllowRule, AllowlistConfig, AllowlistSnapshot};
pub use gate::Rejection;
pub use middleware::{allowlist_middleware, AllowlistGate, PeerAddr};
pub use rate_limit::RateLimiter;
pub use store::AllowlistStore;
