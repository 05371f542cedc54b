use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{Ipv4Addr, SocketAddr};

use super::allowlist::peer_ipv4;
use super::gate::Rejection;
use super::store::AllowlistStore;

/// The caller's address as seen by the gate, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub ipv4: Option<u32>,
    /// Dotted quad when the peer is IPv4, else the raw address
    pub text: String,
}

impl PeerAddr {
    pub fn from_socket(addr: SocketAddr) -> Self {
        let ipv4 = peer_ipv4(addr.ip());
        let text = match ipv4 {
            Some(ip) => Ipv4Addr::from(ip).to_string(),
            None => addr.ip().to_string(),
        };
        Self { ipv4, text }
    }
}

/// Allowlist middleware state for one route group
#[derive(Clone)]
pub struct AllowlistGate {
    store: AllowlistStore,
    record_blocked: bool,
}

impl AllowlistGate {
    /// Rejections are recorded as the store's last blocked address
    pub fn recording(store: AllowlistStore) -> Self {
        Self {
            store,
            record_blocked: true,
        }
    }

    pub fn silent(store: AllowlistStore) -> Self {
        Self {
            store,
            record_blocked: false,
        }
    }
}

pub async fn allowlist_middleware(
    State(gate): State<AllowlistGate>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = PeerAddr::from_socket(addr);

    if !gate.store.snapshot().admits(peer.ipv4) {
        tracing::warn!(
            "Blocked {} {} from {}",
            request.method(),
            request.uri().path(),
            peer.text
        );
        if gate.record_blocked {
            if let Some(ip) = peer.ipv4 {
                gate.store
                    .set_last_blocked_ip(Some(Ipv4Addr::from(ip).to_string()));
            }
        }
        return Rejection::Forbidden.into_response();
    }

    request.extensions_mut().insert(peer);
    next.run(request).await
}
