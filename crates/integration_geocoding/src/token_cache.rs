//! Bearer token cache for OAuth-style providers
//!
//! Holds at most one token per provider instance. Tokens are considered
//! expired a safety margin before the lifetime the provider announced, so a
//! request never goes out with a token that dies in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

/// Safety margin subtracted from every token lifetime
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Source of wall-clock time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}

/// [`Clock`] reading the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A token together with the instant it stops being usable
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// Bearer token
    pub token: String,
    /// Expiry in milliseconds since the Unix epoch, margin already applied
    pub expires_at_ms: i64,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Single-slot expiring token cache
pub struct TokenCache {
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("clock", &self.clock)
            .field("safety_margin", &self.safety_margin)
            .field("slot", &*self.slot.lock())
            .finish()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    /// Create an empty cache using the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache using a custom clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            slot: Mutex::new(None),
        }
    }

    /// Replace the safety margin
    #[must_use]
    pub const fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// The configured safety margin
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Current time in milliseconds since the Unix epoch
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Store `token`, replacing any previous one
    ///
    /// The token stays valid for `ttl` minus the safety margin.
    pub fn put(&self, token: impl Into<String>, ttl: Duration) {
        let expires_at_ms = self
            .now()
            .saturating_add(duration_millis(ttl))
            .saturating_sub(duration_millis(self.safety_margin));

        *self.slot.lock() = Some(CachedToken {
            token: token.into(),
            expires_at_ms,
        });
    }

    /// The stored token, if it has not expired yet
    #[must_use]
    pub fn get(&self) -> Option<String> {
        let now = self.now();
        self.slot
            .lock()
            .as_ref()
            .filter(|cached| now < cached.expires_at_ms)
            .map(|cached| cached.token.clone())
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    /// Clock that only moves when told to
    #[derive(Debug)]
    pub struct ManualClock(AtomicI64);

    impl ManualClock {
        pub fn new(start_ms: i64) -> Self {
            Self(AtomicI64::new(start_ms))
        }

        pub fn advance(&self, by: Duration) {
            self.0.fetch_add(duration_millis(by), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn cache_at(start_ms: i64) -> (Arc<ManualClock>, TokenCache) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let cache = TokenCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_empty_cache_returns_none() {
        let (_, cache) = cache_at(1_000);
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_ttl_above_margin_is_readable_immediately() {
        for ttl_secs in [31, 60, 7_200] {
            let (_, cache) = cache_at(1_000);
            cache.put("abc", Duration::from_secs(ttl_secs));
            assert_eq!(cache.get().as_deref(), Some("abc"), "ttl {ttl_secs}s");
        }
    }

    #[test]
    fn test_ttl_at_or_below_margin_is_absent_immediately() {
        for ttl_secs in [0, 1, 29, 30] {
            let (_, cache) = cache_at(1_000);
            cache.put("abc", Duration::from_secs(ttl_secs));
            assert!(cache.get().is_none(), "ttl {ttl_secs}s");
        }
    }

    #[test]
    fn test_token_expires_with_clock() {
        let (clock, cache) = cache_at(0);
        cache.put("abc", Duration::from_secs(120));

        clock.advance(Duration::from_secs(89));
        assert_eq!(cache.get().as_deref(), Some("abc"));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get().is_none());

        clock.advance(Duration::from_secs(3_600));
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_put_replaces_previous_token() {
        let (clock, cache) = cache_at(0);
        cache.put("first", Duration::from_secs(60));
        clock.advance(Duration::from_secs(40));
        assert!(cache.get().is_none());

        cache.put("second", Duration::from_secs(60));
        assert_eq!(cache.get().as_deref(), Some("second"));
    }

    #[test]
    fn test_custom_safety_margin() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = TokenCache::with_clock(clock.clone()).with_safety_margin(Duration::ZERO);
        assert_eq!(cache.safety_margin(), Duration::ZERO);

        cache.put("abc", Duration::from_millis(10));
        assert_eq!(cache.get().as_deref(), Some("abc"));

        clock.advance(Duration::from_millis(10));
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let (_, cache) = cache_at(1_000);
        cache.put("abc", Duration::MAX);
        assert_eq!(cache.get().as_deref(), Some("abc"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let (_, cache) = cache_at(0);
        cache.put("super-secret", Duration::from_secs(600));
        let debug = format!("{cache:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
