//! Per-instance configuration.
//!
//! Every coordination instance receives its configuration explicitly at
//! construction; there is no process-wide mutable default.

use std::collections::HashSet;
use std::time::Duration;

/// Sliding-window call budget applied to an exposed bridge method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum calls permitted within one window.
    pub max_calls: usize,
    /// Window length.
    pub window: Duration,
}

/// Bridge policy configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Allowed origins for inbound messages. Exact string match
    /// (e.g. `"https://example.com"`). An empty set allows all origins.
    pub allowed_origins: HashSet<String>,
    /// Expected protocol version for inbound bridge envelopes. Messages with
    /// a different version are dropped.
    pub protocol_version: u32,
    /// Optional per-exposed-method call budget.
    pub rate_limit: Option<RateLimit>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: HashSet::new(),
            protocol_version: 1,
            rate_limit: None,
        }
    }
}

/// Top-level configuration for one coordination instance.
#[derive(Clone, Debug)]
pub struct WebViewConfig {
    /// Bridge policy applied when the message bridge is enabled.
    pub bridge: BridgeConfig,
    /// Deadline for host-initiated RPC calls awaiting a peer response.
    pub rpc_call_timeout: Duration,
}

impl Default for WebViewConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            rpc_call_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WebViewConfig::default();
        assert_eq!(config.rpc_call_timeout, Duration::from_secs(30));
        assert_eq!(config.bridge.protocol_version, 1);
        assert!(config.bridge.allowed_origins.is_empty());
        assert!(config.bridge.rate_limit.is_none());
    }
}
