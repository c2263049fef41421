//! Protocol configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Handshake timestamps outside `now ± skew_window` are stale
    pub skew_window: Duration,

    /// A handshake without a confirm inside this window transitions to
    /// `Failed`
    pub handshake_timeout: Duration,

    /// Hard session lifetime
    pub session_ttl: Duration,

    /// Idle sessions transition to `Closing` after this long without
    /// traffic
    pub idle_timeout: Duration,

    /// AEAD failures per session before tear-down
    pub auth_fail_threshold: u32,

    /// Bound on the anti-replay nonce cache
    pub nonce_cache_max: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            skew_window: Duration::from_secs(5 * 60),
            handshake_timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(60 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
            auth_fail_threshold: 3,
            nonce_cache_max: 4096,
        }
    }
}

impl ProtocolConfig {
    pub fn with_skew_window(mut self, window: Duration) -> Self {
        self.skew_window = window;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_auth_fail_threshold(mut self, threshold: u32) -> Self {
        self.auth_fail_threshold = threshold;
        self
    }
}
