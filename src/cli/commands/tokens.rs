use crate::engine::config::{
    DEFAULT_ACCESS_TOKEN_TTL_SECONDS, DEFAULT_REFRESH_TOKEN_TTL_SECONDS, DEFAULT_TOKEN_ISSUER,
};
use anyhow::{bail, Context};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_SIGNING_KEY_ID: &str = "signing-key-id";
pub const ARG_RETIRED_SIGNING_KEYS: &str = "retired-signing-keys";

pub struct Options {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub issuer: String,
    pub signing_key: SecretString,
    pub signing_key_id: String,
    pub retired_signing_keys: Vec<(String, SecretString)>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let retired: Vec<&str> = self
            .retired_signing_keys
            .iter()
            .map(|(kid, _)| kid.as_str())
            .collect();
        f.debug_struct("Options")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("issuer", &self.issuer)
            .field("signing_key", &"***")
            .field("signing_key_id", &self.signing_key_id)
            .field("retired_signing_keys", &retired)
            .finish()
    }
}

impl Options {
    /// Parse token lifetimes and signing keys from matches.
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or the retired key list is malformed.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let signing_key = match matches.get_one::<String>(ARG_SIGNING_KEY) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => bail!("missing required argument: --{ARG_SIGNING_KEY}"),
        };

        let retired_signing_keys = matches
            .get_one::<String>(ARG_RETIRED_SIGNING_KEYS)
            .map(|value| parse_retired_keys(value))
            .transpose()
            .with_context(|| format!("invalid --{ARG_RETIRED_SIGNING_KEYS}"))?
            .unwrap_or_default();

        Ok(Self {
            access_token_ttl: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                    .copied()
                    .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            ),
            refresh_token_ttl: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_REFRESH_TOKEN_TTL_SECONDS)
                    .copied()
                    .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECONDS),
            ),
            issuer: matches
                .get_one::<String>(ARG_TOKEN_ISSUER)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_ISSUER.to_string()),
            signing_key,
            signing_key_id: matches
                .get_one::<String>(ARG_SIGNING_KEY_ID)
                .cloned()
                .unwrap_or_else(|| "k1".to_string()),
            retired_signing_keys,
        })
    }
}

/// Parse `kid=secret,kid=secret`.
fn parse_retired_keys(value: &str) -> anyhow::Result<Vec<(String, SecretString)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let Some((kid, secret)) = pair.split_once('=') else {
                bail!("expected KID=SECRET");
            };
            let kid = kid.trim();
            if kid.is_empty() || secret.is_empty() {
                bail!("expected KID=SECRET");
            }
            Ok((kid.to_string(), SecretString::from(secret.to_string())))
        })
        .collect()
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long("access-token-ttl-seconds")
                .help("Access token lifetime in seconds")
                .env("AUTHKEEP_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long("refresh-token-ttl-seconds")
                .help("Refresh token lifetime in seconds, renewed on every rotation")
                .env("AUTHKEEP_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long("token-issuer")
                .help("Value of the iss claim in access tokens")
                .env("AUTHKEEP_TOKEN_ISSUER")
                .default_value(DEFAULT_TOKEN_ISSUER),
        )
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long("signing-key")
                .help("HMAC secret used to sign access tokens")
                .env("AUTHKEEP_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SIGNING_KEY_ID)
                .long("signing-key-id")
                .help("Key id placed in the kid header of new access tokens")
                .env("AUTHKEEP_SIGNING_KEY_ID")
                .default_value("k1"),
        )
        .arg(
            Arg::new(ARG_RETIRED_SIGNING_KEYS)
                .long("retired-signing-keys")
                .help("Keys still accepted for verification, as KID=SECRET,KID=SECRET")
                .env("AUTHKEEP_RETIRED_SIGNING_KEYS")
                .hide_env_values(true),
        )
}
