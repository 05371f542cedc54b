//! In-process allowlist configuration with live snapshots
//!
//! Every mutation recompiles the rule set and publishes a fresh
//! [`AllowlistSnapshot`] through a `watch` channel, so readers never see a
//! half-applied update.

use std::sync::Arc;
use tokio::sync::watch;

use super::allowlist::{normalize_entry, AllowlistConfig, AllowlistSnapshot};
use crate::config::AllowlistSettings;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AllowlistStore {
    tx: Arc<watch::Sender<Arc<AllowlistSnapshot>>>,
}

impl AllowlistStore {
    pub fn new(config: AllowlistConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(AllowlistSnapshot::compile(config)));
        Self { tx: Arc::new(tx) }
    }

    pub fn from_settings(settings: &AllowlistSettings) -> Self {
        Self::new(AllowlistConfig {
            enabled: settings.enabled,
            entries: settings.entries.clone(),
            last_blocked_ip: None,
        })
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<AllowlistSnapshot> {
        self.tx.borrow().clone()
    }

    /// Observe every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<AllowlistSnapshot>> {
        self.tx.subscribe()
    }

    fn update(&self, apply: impl FnOnce(&mut AllowlistConfig) -> bool) {
        self.tx.send_if_modified(|current| {
            let mut config = current.config.clone();
            if !apply(&mut config) {
                return false;
            }
            *current = Arc::new(AllowlistSnapshot::compile(config));
            true
        });
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update(|config| {
            let changed = config.enabled != enabled;
            config.enabled = enabled;
            changed
        });
        tracing::info!("Allowlist {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Normalize and append an entry; duplicates are ignored
    pub fn add_entry(&self, raw: &str) -> Result<String> {
        let normalized = normalize_entry(raw)?;
        let entry = normalized.clone();
        self.update(move |config| {
            if config.entries.contains(&entry) {
                return false;
            }
            config.entries.push(entry);
            true
        });
        tracing::info!("Allowlist entry added: {}", normalized);
        Ok(normalized)
    }

    /// Remove every entry equal to the normalized form of `raw`
    pub fn remove_entry(&self, raw: &str) -> Result<()> {
        let normalized = normalize_entry(raw)?;
        self.update(|config| {
            let before = config.entries.len();
            config.entries.retain(|e| *e != normalized);
            config.entries.len() != before
        });
        Ok(())
    }

    pub fn clear_entries(&self) {
        self.update(|config| {
            let changed = !config.entries.is_empty();
            config.entries.clear();
            changed
        });
    }

    pub fn set_last_blocked_ip(&self, ip: Option<String>) {
        self.update(|config| {
            let changed = config.last_blocked_ip != ip;
            config.last_blocked_ip = ip;
            changed
        });
    }
}

impl Default for AllowlistStore {
    fn default() -> Self {
        Self::new(AllowlistConfig::default())
    }
}
