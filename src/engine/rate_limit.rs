//! Rate limiting primitives for auth flows.
//!
//! Fixed windows per (key, action). The first `max_attempts` attempts inside a
//! window are allowed; later ones are throttled until the window ends and are
//! not counted.

use crate::engine::config::AuthConfig;
use dashmap::DashMap;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    Refresh,
    Logout,
}

impl RateLimitAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Refresh => "refresh",
            Self::Logout => "logout",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Throttled { retry_after: Duration },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

/// Which buckets gate a login attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitKeyScope {
    /// One bucket per client address; stops credential stuffing from one source.
    Ip,
    /// One bucket per normalized email; stops distributed guessing against one account.
    Account,
    /// Both buckets must allow the attempt.
    Combined,
}

impl FromStr for RateLimitKeyScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "account" => Ok(Self::Account),
            "combined" => Ok(Self::Combined),
            other => Err(format!("unknown rate limit scope: {other}")),
        }
    }
}

impl fmt::Display for RateLimitKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ip => "ip",
            Self::Account => "account",
            Self::Combined => "combined",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    Ip(String),
    Account(String),
    /// Fingerprint of a presented refresh token, used when no address is known.
    Token(String),
}

pub trait RateLimiter: Send + Sync {
    /// Count an attempt for `key` and decide whether it may proceed.
    fn check_and_record(&self, key: &RateLimitKey, action: RateLimitAction) -> RateLimitDecision;

    /// Forget the bucket for `key`, typically after a successful authentication.
    fn clear(&self, key: &RateLimitKey, action: RateLimitAction);

    /// Drop buckets whose window has elapsed; returns how many were removed.
    fn evict_expired(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_and_record(&self, _key: &RateLimitKey, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn clear(&self, _key: &RateLimitKey, _action: RateLimitAction) {}

    fn evict_expired(&self) -> usize {
        0
    }
}

#[derive(Clone, Copy, Debug)]
struct RateLimitBucket {
    attempts: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

impl RateLimitBucket {
    fn new(now: Instant) -> Self {
        Self {
            attempts: 0,
            window_start: now,
            locked_until: None,
        }
    }
}

/// Process-local limiter. Each bucket is mutated under its `DashMap` shard
/// lock, so increments for one key are atomic.
#[derive(Clone, Debug)]
pub struct InMemoryRateLimiter {
    buckets: Arc<DashMap<(RateLimitKey, RateLimitAction), RateLimitBucket>>,
    login: RateLimitPolicy,
    refresh: RateLimitPolicy,
    logout: RateLimitPolicy,
}

impl InMemoryRateLimiter {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            login: config.policy(RateLimitAction::Login),
            refresh: config.policy(RateLimitAction::Refresh),
            logout: config.policy(RateLimitAction::Logout),
        }
    }

    fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        match action {
            RateLimitAction::Login => self.login,
            RateLimitAction::Refresh => self.refresh,
            RateLimitAction::Logout => self.logout,
        }
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check_and_record(&self, key: &RateLimitKey, action: RateLimitAction) -> RateLimitDecision {
        let policy = self.policy(action);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry((key.clone(), action))
            .or_insert_with(|| RateLimitBucket::new(now));

        let window_end = bucket.window_start + policy.window;
        if now >= window_end {
            *bucket = RateLimitBucket::new(now);
        }
        let window_end = bucket.window_start + policy.window;

        if bucket.attempts >= policy.max_attempts {
            bucket.locked_until = Some(window_end);
            return RateLimitDecision::Throttled {
                retry_after: window_end.saturating_duration_since(now),
            };
        }

        bucket.attempts += 1;
        if bucket.attempts >= policy.max_attempts {
            bucket.locked_until = Some(window_end);
        }
        RateLimitDecision::Allowed
    }

    fn clear(&self, key: &RateLimitKey, action: RateLimitAction) {
        self.buckets.remove(&(key.clone(), action));
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|(_, action), bucket| {
            let window_end = bucket.window_start + self.policy(*action).window;
            let lock_end = bucket.locked_until.unwrap_or(window_end);
            now < window_end.max(lock_end)
        });
        before.saturating_sub(self.buckets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_attempts: u32, window_secs: u64) -> InMemoryRateLimiter {
        let policy = RateLimitPolicy::new(max_attempts, Duration::from_secs(window_secs));
        let config = AuthConfig::new()
            .with_policy(RateLimitAction::Login, policy)
            .with_policy(RateLimitAction::Refresh, policy);
        InMemoryRateLimiter::new(&config)
    }

    fn ip(value: &str) -> RateLimitKey {
        RateLimitKey::Ip(value.to_string())
    }

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert_eq!(
                limiter.check_and_record(&ip("1.2.3.4"), RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(limiter.evict_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttles_attempt_after_limit() {
        let limiter = limiter(5, 900);
        let key = ip("1.2.3.4");
        for _ in 0..5 {
            assert!(limiter
                .check_and_record(&key, RateLimitAction::Login)
                .is_allowed());
        }
        assert_eq!(
            limiter.check_and_record(&key, RateLimitAction::Login),
            RateLimitDecision::Throttled {
                retry_after: Duration::from_secs(900)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_counts_down_and_window_resets() {
        let limiter = limiter(2, 60);
        let key = ip("1.2.3.4");
        limiter.check_and_record(&key, RateLimitAction::Login);
        limiter.check_and_record(&key, RateLimitAction::Login);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(
            limiter.check_and_record(&key, RateLimitAction::Login),
            RateLimitDecision::Throttled {
                retry_after: Duration::from_secs(15)
            }
        );

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(limiter
            .check_and_record(&key, RateLimitAction::Login)
            .is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_attempts_do_not_extend_lockout() {
        let limiter = limiter(1, 60);
        let key = ip("1.2.3.4");
        assert!(limiter
            .check_and_record(&key, RateLimitAction::Login)
            .is_allowed());
        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(5)).await;
            assert!(!limiter
                .check_and_record(&key, RateLimitAction::Login)
                .is_allowed());
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter
            .check_and_record(&key, RateLimitAction::Login)
            .is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn buckets_are_scoped_by_key_and_action() {
        let limiter = limiter(1, 60);
        assert!(limiter
            .check_and_record(&ip("1.1.1.1"), RateLimitAction::Login)
            .is_allowed());
        assert!(!limiter
            .check_and_record(&ip("1.1.1.1"), RateLimitAction::Login)
            .is_allowed());
        assert!(limiter
            .check_and_record(&ip("2.2.2.2"), RateLimitAction::Login)
            .is_allowed());
        assert!(limiter
            .check_and_record(&ip("1.1.1.1"), RateLimitAction::Refresh)
            .is_allowed());
        assert!(limiter
            .check_and_record(
                &RateLimitKey::Account("1.1.1.1".to_string()),
                RateLimitAction::Login
            )
            .is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_bucket() {
        let limiter = limiter(1, 60);
        let key = ip("1.2.3.4");
        limiter.check_and_record(&key, RateLimitAction::Login);
        assert!(!limiter
            .check_and_record(&key, RateLimitAction::Login)
            .is_allowed());
        limiter.clear(&key, RateLimitAction::Login);
        assert!(limiter
            .check_and_record(&key, RateLimitAction::Login)
            .is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn evict_drops_only_elapsed_buckets() {
        let limiter = limiter(5, 60);
        limiter.check_and_record(&ip("1.1.1.1"), RateLimitAction::Login);
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.check_and_record(&ip("2.2.2.2"), RateLimitAction::Login);
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(limiter.evict_expired(), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_attempts_are_counted_once_each() -> anyhow::Result<()> {
        let limiter = Arc::new(limiter(10, 60));
        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.check_and_record(&RateLimitKey::Ip("9.9.9.9".to_string()), RateLimitAction::Login)
            }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await?.is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
        Ok(())
    }

    #[test]
    fn scope_parses_from_text() {
        assert_eq!("IP".parse::<RateLimitKeyScope>(), Ok(RateLimitKeyScope::Ip));
        assert_eq!(
            "combined".parse::<RateLimitKeyScope>(),
            Ok(RateLimitKeyScope::Combined)
        );
        assert!("region".parse::<RateLimitKeyScope>().is_err());
        assert_eq!(RateLimitKeyScope::Account.to_string(), "account");
    }
}
