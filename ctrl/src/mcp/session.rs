//! Protocol session lifecycle: initialize handshake, version negotiation, expiry

use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use uuid::Uuid;

use super::jsonrpc::RpcError;

/// Supported protocol versions, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-03-26", "2024-11-05"];

pub const HEADER_SESSION_ID: &str = "mcp-session-id";
pub const HEADER_PROTOCOL_VERSION: &str = "mcp-protocol-version";

/// Pick the requested version when supported, else the newest one
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub protocol_version: String,
    pub initialized: bool,
    pub last_seen_ms: i64,
}

/// Result of an explicit session close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    NotFound,
}

/// Session identity presented by a caller on a follow-up call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRef {
    pub session_id: Option<String>,
    pub protocol_version: Option<String>,
}

/// Owns every protocol session of one gateway instance
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<String, Session>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an uninitialized session under a fresh random id
    pub fn open(&self, protocol_version: &str) -> Session {
        self.open_with_id(Uuid::new_v4().to_string(), protocol_version)
    }

    /// Create (or replace) an uninitialized session under a caller-chosen id.
    /// Used by the SSE transport, whose stream id doubles as the session id.
    pub fn open_with_id(&self, id: String, protocol_version: &str) -> Session {
        let session = Session {
            id: id.clone(),
            protocol_version: protocol_version.to_string(),
            initialized: false,
            last_seen_ms: now_ms(),
        };
        if self.sessions.insert(id, session.clone()).is_some() {
            tracing::debug!("Re-initialized MCP session {}", session.id);
        }
        crate::metrics::set_sessions_active(self.sessions.len());
        session
    }

    /// Look up a session, validating the optional protocol-version header, and refresh it
    pub fn touch(&self, caller: &SessionRef) -> Result<Session, RpcError> {
        let sid = caller
            .session_id
            .as_deref()
            .ok_or_else(|| RpcError::invalid_request("Missing mcp-session-id header"))?;

        let mut entry = self
            .sessions
            .get_mut(sid)
            .ok_or_else(RpcError::session_not_found)?;

        if let Some(proto) = caller.protocol_version.as_deref() {
            if proto != entry.protocol_version {
                return Err(RpcError::invalid_request("Unsupported mcp-protocol-version"));
            }
        }

        entry.last_seen_ms = now_ms();
        Ok(entry.clone())
    }

    /// Like [`touch`](Self::touch) but the handshake must have completed
    pub fn touch_initialized(&self, caller: &SessionRef) -> Result<Session, RpcError> {
        let session = self.touch(caller)?;
        if !session.initialized {
            return Err(RpcError::invalid_request("Server not initialized"));
        }
        Ok(session)
    }

    /// Handle `notifications/initialized`
    pub fn mark_initialized(&self, caller: &SessionRef) -> Result<(), RpcError> {
        let session = self.touch(caller)?;
        if let Some(mut entry) = self.sessions.get_mut(&session.id) {
            entry.initialized = true;
            entry.last_seen_ms = now_ms();
        }
        tracing::debug!("MCP session {} initialized", session.id);
        Ok(())
    }

    pub fn close(&self, session_id: &str) -> CloseOutcome {
        let outcome = match self.sessions.remove(session_id) {
            Some(_) => CloseOutcome::Closed,
            None => CloseOutcome::NotFound,
        };
        crate::metrics::set_sessions_active(self.sessions.len());
        outcome
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Drop sessions not seen for longer than `max_idle`; returns how many were removed
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let idle_ms = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms().saturating_sub(idle_ms);
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_seen_ms >= cutoff);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!("Evicted {} idle MCP sessions", removed);
            crate::metrics::set_sessions_active(self.sessions.len());
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::jsonrpc::{INVALID_REQUEST, SESSION_NOT_FOUND};

    fn caller(id: &str) -> SessionRef {
        SessionRef {
            session_id: Some(id.to_string()),
            protocol_version: None,
        }
    }

    #[test]
    fn test_negotiate_version() {
        assert_eq!(negotiate_version("2025-03-26"), "2025-03-26");
        assert_eq!(negotiate_version("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_version("1999-01-01"), "2025-11-25");
        assert_eq!(negotiate_version(""), SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[test]
    fn test_handshake_states() {
        let manager = SessionManager::new();
        let session = manager.open("2025-03-26");
        assert!(!session.initialized);

        // ping-style access works before the handshake completes
        assert!(manager.touch(&caller(&session.id)).is_ok());

        let err = manager.touch_initialized(&caller(&session.id)).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
        assert_eq!(err.message, "Server not initialized");

        manager.mark_initialized(&caller(&session.id)).unwrap();
        assert!(manager.touch_initialized(&caller(&session.id)).is_ok());
    }

    #[test]
    fn test_unknown_and_missing_session() {
        let manager = SessionManager::new();
        let err = manager.touch(&caller("nope")).unwrap_err();
        assert_eq!(err.code, SESSION_NOT_FOUND);

        let err = manager.touch(&SessionRef::default()).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);

        assert_eq!(
            manager.mark_initialized(&caller("nope")).unwrap_err().code,
            SESSION_NOT_FOUND
        );
    }

    #[test]
    fn test_protocol_version_header_must_match() {
        let manager = SessionManager::new();
        let session = manager.open("2025-03-26");

        let mut matching = caller(&session.id);
        matching.protocol_version = Some("2025-03-26".to_string());
        assert!(manager.touch(&matching).is_ok());

        let mut other = caller(&session.id);
        other.protocol_version = Some("2024-11-05".to_string());
        let err = manager.touch(&other).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
        assert_eq!(err.message, "Unsupported mcp-protocol-version");
    }

    #[test]
    fn test_close_reports_not_found_on_repeat() {
        let manager = SessionManager::new();
        let session = manager.open("2024-11-05");
        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.close(&session.id), CloseOutcome::Closed);
        assert_eq!(manager.close(&session.id), CloseOutcome::NotFound);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(
            manager.touch(&caller(&session.id)).unwrap_err().code,
            SESSION_NOT_FOUND
        );
    }

    #[test]
    fn test_session_ids_are_unique() {
        let manager = SessionManager::new();
        let a = manager.open("2025-03-26");
        let b = manager.open("2025-03-26");
        assert_ne!(a.id, b.id);
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_evict_idle() {
        let manager = SessionManager::new();
        let stale = manager.open("2025-03-26");
        let fresh = manager.open("2025-03-26");
        manager
            .sessions
            .get_mut(&stale.id)
            .unwrap()
            .last_seen_ms -= 120_000;

        assert_eq!(manager.evict_idle(Duration::from_secs(60)), 1);
        assert!(manager.get(&stale.id).is_none());
        assert!(manager.get(&fresh.id).is_some());
    }

    #[test]
    fn test_huge_idle_timeout_keeps_fresh_sessions() {
        let manager = SessionManager::new();
        let session = manager.open("2025-11-25");
        assert_eq!(manager.evict_idle(Duration::from_secs(u64::MAX)), 0);
        assert!(manager.get(&session.id).is_some());
    }
}
