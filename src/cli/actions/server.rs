use crate::{
    api::{
        self, handlers::auth::provider_token::GoogleTokenVerifier, StorageBackend, TrustedProxies,
    },
    engine::{
        accounts::{AccountDirectory, InMemoryAccounts, PgAccountDirectory},
        hasher::{Argon2Hasher, CredentialHasher},
        housekeeping::Housekeeping,
        provider::{ClaimValidators, GoogleClaimValidator},
        rate_limit::{InMemoryRateLimiter, RateLimitAction, RateLimitKeyScope, RateLimitPolicy},
        signer::{SigningKey, SigningKeySet, TokenSigner},
        store::{InMemoryRefreshTokenStore, PgRefreshTokenStore, RefreshTokenStore},
        verifier::normalize_email,
        AuthConfig, AuthOrchestrator, CredentialVerifier, TokenIssuer,
    },
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{net::IpAddr, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub housekeeping_interval: Duration,
    pub dev_account: Option<(String, SecretString)>,
    pub trusted_proxies: Vec<IpAddr>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub token_issuer: String,
    pub signing_key: SecretString,
    pub signing_key_id: String,
    pub retired_signing_keys: Vec<(String, SecretString)>,
    pub rate_limit_scope: RateLimitKeyScope,
    pub login_policy: RateLimitPolicy,
    pub refresh_policy: RateLimitPolicy,
    pub rate_limit_clear_on_success: bool,
    pub google_client_ids: Vec<String>,
    pub google_jwks_url: String,
    pub google_jwks_cache_ttl: Duration,
    pub password_hash_memory_kib: u32,
    pub password_hash_iterations: u32,
    pub password_hash_parallelism: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if keys or hash parameters are invalid, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new()
        .with_access_token_ttl(args.access_token_ttl)
        .with_refresh_token_ttl(args.refresh_token_ttl)
        .with_issuer(args.token_issuer)
        .with_key_scope(args.rate_limit_scope)
        .with_policy(RateLimitAction::Login, args.login_policy)
        .with_policy(RateLimitAction::Refresh, args.refresh_policy)
        .with_policy(RateLimitAction::Logout, args.refresh_policy)
        .with_clear_on_success(args.rate_limit_clear_on_success)
        .with_google_client_ids(args.google_client_ids);

    debug!("Auth config: {:?}", config);

    let hasher: Arc<dyn CredentialHasher> = Arc::new(
        Argon2Hasher::new(
            args.password_hash_memory_kib,
            args.password_hash_iterations,
            args.password_hash_parallelism,
        )
        .context("Invalid password hash parameters")?,
    );

    let retired = args
        .retired_signing_keys
        .into_iter()
        .map(|(kid, secret)| SigningKey::new(kid, secret))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid retired signing key")?;
    let keys = SigningKeySet::new(
        SigningKey::new(args.signing_key_id, args.signing_key).context("Invalid signing key")?,
    )
    .with_retired(retired)
    .context("Invalid retired signing keys")?;
    info!(kid = keys.current_kid(), "access token signing key loaded");
    let signer = Arc::new(TokenSigner::new(keys, config.issuer()));

    let (accounts, store, backend): (
        Arc<dyn AccountDirectory>,
        Arc<dyn RefreshTokenStore>,
        StorageBackend,
    ) = if let Some(dsn) = &args.dsn {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        (
            Arc::new(PgAccountDirectory::new(pool.clone())),
            Arc::new(PgRefreshTokenStore::new(pool.clone())),
            StorageBackend::Postgres(pool),
        )
    } else {
        warn!("No --dsn given, accounts and refresh tokens are kept in memory only");
        let accounts = Arc::new(InMemoryAccounts::new());
        if let Some((email, password)) = &args.dev_account {
            let digest = hasher.hash(password.expose_secret())?;
            let subject = accounts
                .register_password(&normalize_email(email), digest, hasher.current_version())
                .await?;
            info!(subject = %subject, "seeded development account");
        }
        (
            accounts,
            Arc::new(InMemoryRefreshTokenStore::new()),
            StorageBackend::Memory,
        )
    };

    let mut validators = ClaimValidators::new();
    if !config.google_client_ids().is_empty() {
        validators = validators.with(Arc::new(GoogleClaimValidator::new(
            config.google_client_ids().to_vec(),
        )));
    }

    let google_enabled = !config.google_client_ids().is_empty();
    let limiter = Arc::new(InMemoryRateLimiter::new(&config));
    let verifier = CredentialVerifier::new(hasher, accounts, validators)?;
    let issuer = TokenIssuer::new(
        signer,
        store.clone(),
        config.access_token_ttl(),
        config.refresh_token_ttl(),
    );

    let mut orchestrator = AuthOrchestrator::new(config, limiter.clone(), verifier, issuer);
    if google_enabled {
        let google = GoogleTokenVerifier::new(args.google_jwks_url, args.google_jwks_cache_ttl)?;
        orchestrator = orchestrator.with_provider_tokens(Arc::new(google));
    } else {
        info!("Google Sign-In disabled, no --google-client-id configured");
    }

    let housekeeping = Housekeeping::new(store, limiter).spawn(args.housekeeping_interval);

    let trusted_proxies = TrustedProxies::new(args.trusted_proxies);

    let result = api::new(args.port, Arc::new(orchestrator), backend, trusted_proxies).await;

    housekeeping.abort();

    result
}
