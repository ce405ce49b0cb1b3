//! Map validated CLI arguments to the action that runs them.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    hasher, provider, rate_limit, tokens, ARG_DEV_ACCOUNT, ARG_DSN,
    ARG_HOUSEKEEPING_INTERVAL_SECONDS, ARG_PORT, ARG_TRUSTED_PROXY,
};
use anyhow::{bail, Result};
use secrecy::SecretString;
use std::{net::IpAddr, time::Duration};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|v| !v.trim().is_empty());
    let housekeeping_interval = Duration::from_secs(
        matches
            .get_one::<u64>(ARG_HOUSEKEEPING_INTERVAL_SECONDS)
            .copied()
            .unwrap_or(300),
    );
    let dev_account = matches
        .get_one::<String>(ARG_DEV_ACCOUNT)
        .map(|value| parse_dev_account(value))
        .transpose()?;
    let trusted_proxies = matches
        .get_many::<IpAddr>(ARG_TRUSTED_PROXY)
        .map(|values| values.copied().collect())
        .unwrap_or_default();

    let token_opts = tokens::Options::parse(matches)?;
    let rate_limit_opts = rate_limit::Options::parse(matches);
    let provider_opts = provider::Options::parse(matches);
    let hasher_opts = hasher::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        housekeeping_interval,
        dev_account,
        trusted_proxies,
        access_token_ttl: token_opts.access_token_ttl,
        refresh_token_ttl: token_opts.refresh_token_ttl,
        token_issuer: token_opts.issuer,
        signing_key: token_opts.signing_key,
        signing_key_id: token_opts.signing_key_id,
        retired_signing_keys: token_opts.retired_signing_keys,
        rate_limit_scope: rate_limit_opts.scope,
        login_policy: rate_limit_opts.login,
        refresh_policy: rate_limit_opts.refresh,
        rate_limit_clear_on_success: rate_limit_opts.clear_on_success,
        google_client_ids: provider_opts.google_client_ids,
        google_jwks_url: provider_opts.google_jwks_url,
        google_jwks_cache_ttl: provider_opts.google_jwks_cache_ttl,
        password_hash_memory_kib: hasher_opts.memory_kib,
        password_hash_iterations: hasher_opts.iterations,
        password_hash_parallelism: hasher_opts.parallelism,
    }))
}

fn parse_dev_account(value: &str) -> Result<(String, SecretString)> {
    let Some((email, password)) = value.split_once(':') else {
        bail!("--{ARG_DEV_ACCOUNT} expects EMAIL:PASSWORD");
    };
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        bail!("--{ARG_DEV_ACCOUNT} expects EMAIL:PASSWORD");
    }
    Ok((email.to_string(), SecretString::from(password.to_string())))
}
