//! Engine configuration, built once at startup and passed explicitly.

use crate::engine::rate_limit::{RateLimitAction, RateLimitKeyScope, RateLimitPolicy};
use std::time::Duration;

pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_TOKEN_ISSUER: &str = "authkeep";
pub const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_REFRESH_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    issuer: String,
    login_policy: RateLimitPolicy,
    refresh_policy: RateLimitPolicy,
    logout_policy: RateLimitPolicy,
    key_scope: RateLimitKeyScope,
    clear_on_success: bool,
    google_client_ids: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        let window = Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS);
        Self {
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_TTL_SECONDS),
            issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            login_policy: RateLimitPolicy::new(DEFAULT_LOGIN_MAX_ATTEMPTS, window),
            refresh_policy: RateLimitPolicy::new(DEFAULT_REFRESH_MAX_ATTEMPTS, window),
            logout_policy: RateLimitPolicy::new(DEFAULT_REFRESH_MAX_ATTEMPTS, window),
            key_scope: RateLimitKeyScope::Combined,
            clear_on_success: true,
            google_client_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, action: RateLimitAction, policy: RateLimitPolicy) -> Self {
        match action {
            RateLimitAction::Login => self.login_policy = policy,
            RateLimitAction::Refresh => self.refresh_policy = policy,
            RateLimitAction::Logout => self.logout_policy = policy,
        }
        self
    }

    #[must_use]
    pub fn with_key_scope(mut self, scope: RateLimitKeyScope) -> Self {
        self.key_scope = scope;
        self
    }

    #[must_use]
    pub fn with_clear_on_success(mut self, clear: bool) -> Self {
        self.clear_on_success = clear;
        self
    }

    #[must_use]
    pub fn with_google_client_ids(mut self, client_ids: Vec<String>) -> Self {
        self.google_client_ids = client_ids;
        self
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        match action {
            RateLimitAction::Login => self.login_policy,
            RateLimitAction::Refresh => self.refresh_policy,
            RateLimitAction::Logout => self.logout_policy,
        }
    }

    #[must_use]
    pub fn key_scope(&self) -> RateLimitKeyScope {
        self.key_scope
    }

    #[must_use]
    pub fn clear_on_success(&self) -> bool {
        self.clear_on_success
    }

    #[must_use]
    pub fn google_client_ids(&self) -> &[String] {
        &self.google_client_ids
    }
}
