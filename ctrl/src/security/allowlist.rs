//! IPv4 allow rules and compiled allowlist snapshots

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Error, Result};

/// 127.0.0.1 is always admitted
pub const LOOPBACK: u32 = 0x7F00_0001;

static IPV4_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,3})(\.([0-9]{1,3})){3}$").expect("valid IPv4 regex"));

/// One allowlist entry, compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowRule {
    Exact(u32),
    Cidr { network: u32, prefix: u8 },
}

impl AllowRule {
    pub fn matches(&self, ip: u32) -> bool {
        match *self {
            AllowRule::Exact(addr) => addr == ip,
            AllowRule::Cidr { network, prefix } => {
                let mask = cidr_mask(prefix);
                (ip & mask) == (network & mask)
            }
        }
    }
}

impl fmt::Display for AllowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AllowRule::Exact(addr) => write!(f, "{}", Ipv4Addr::from(addr)),
            AllowRule::Cidr { network, prefix } => {
                write!(f, "{}/{}", Ipv4Addr::from(network), prefix)
            }
        }
    }
}

fn cidr_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix.min(32)))
    }
}

/// Parse a dotted-quad literal. Only the strict `a.b.c.d` form is accepted.
pub fn parse_ipv4(raw: &str) -> Result<u32> {
    let s = raw.trim();
    if !IPV4_LITERAL.is_match(s) {
        return Err(Error::InvalidAllowEntry(format!("Invalid IPv4 address: {}", s)));
    }
    let mut ip = 0u32;
    for octet in s.split('.') {
        let value: u32 = octet
            .parse()
            .map_err(|_| Error::InvalidAllowEntry(format!("Invalid IPv4 address: {}", s)))?;
        if value > 255 {
            return Err(Error::InvalidAllowEntry(format!("Invalid IPv4 address: {}", s)));
        }
        ip = (ip << 8) | value;
    }
    Ok(ip)
}

/// Parse `a.b.c.d` or `a.b.c.d/prefix`
pub fn parse_entry(raw: &str) -> Result<AllowRule> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(Error::InvalidAllowEntry("Empty entry".to_string()));
    }

    match s.split_once('/') {
        None => Ok(AllowRule::Exact(parse_ipv4(s)?)),
        Some((addr, prefix)) => {
            let network = parse_ipv4(addr)?;
            let prefix: u8 = prefix
                .trim()
                .parse()
                .map_err(|_| Error::InvalidAllowEntry(format!("Invalid CIDR prefix: {}", s)))?;
            if prefix > 32 {
                return Err(Error::InvalidAllowEntry(format!(
                    "CIDR prefix out of range: {}",
                    s
                )));
            }
            Ok(AllowRule::Cidr { network, prefix })
        }
    }
}

/// Canonical textual form of an entry (whitespace stripped, dotted quad)
pub fn normalize_entry(raw: &str) -> Result<String> {
    parse_entry(raw).map(|rule| rule.to_string())
}

/// IPv4 of a caller given as text. Only numeric forms are accepted; hostnames
/// are never resolved.
pub fn parse_remote_ipv4(remote: &str) -> Option<u32> {
    let s = remote.trim();
    if IPV4_LITERAL.is_match(s) {
        return parse_ipv4(s).ok();
    }
    s.parse::<IpAddr>().ok().and_then(peer_ipv4)
}

/// IPv4 of a socket peer, unwrapping IPv4-mapped IPv6 addresses
pub fn peer_ipv4(ip: IpAddr) -> Option<u32> {
    match ip {
        IpAddr::V4(v4) => Some(u32::from(v4)),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(u32::from),
    }
}

/// Allowlist settings as owned by the configuration collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistConfig {
    pub enabled: bool,
    pub entries: Vec<String>,
    pub last_blocked_ip: Option<String>,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entries: Vec::new(),
            last_blocked_ip: None,
        }
    }
}

impl AllowlistConfig {
    /// Compile every valid entry, skipping the rest
    pub fn compiled_rules(&self) -> Vec<AllowRule> {
        self.entries
            .iter()
            .filter_map(|raw| match parse_entry(raw) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!("Skipping allowlist entry {:?}: {}", raw, e);
                    None
                }
            })
            .collect()
    }
}

/// A configuration together with its compiled rules, published as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistSnapshot {
    pub config: AllowlistConfig,
    pub rules: Vec<AllowRule>,
}

impl AllowlistSnapshot {
    pub fn compile(config: AllowlistConfig) -> Self {
        let rules = config.compiled_rules();
        Self { config, rules }
    }

    /// Admission decision for a caller; `None` is an address that could not
    /// be read as IPv4
    pub fn admits(&self, ip: Option<u32>) -> bool {
        if !self.config.enabled || ip == Some(LOOPBACK) {
            return true;
        }
        ip.is_some_and(|ip| self.rules.iter().any(|rule| rule.matches(ip)))
    }
}
