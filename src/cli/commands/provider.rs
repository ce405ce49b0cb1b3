use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_JWKS_URL: &str = "google-jwks-url";
pub const ARG_GOOGLE_JWKS_CACHE_SECONDS: &str = "google-jwks-cache-seconds";

pub const DEFAULT_GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

#[derive(Debug)]
pub struct Options {
    /// Accepted `aud` values. Empty disables Google Sign-In.
    pub google_client_ids: Vec<String>,
    pub google_jwks_url: String,
    pub google_jwks_cache_ttl: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let google_client_ids = matches
            .get_many::<String>(ARG_GOOGLE_CLIENT_ID)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            google_client_ids,
            google_jwks_url: matches
                .get_one::<String>(ARG_GOOGLE_JWKS_URL)
                .cloned()
                .unwrap_or_else(|| DEFAULT_GOOGLE_JWKS_URL.to_string()),
            google_jwks_cache_ttl: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_GOOGLE_JWKS_CACHE_SECONDS)
                    .copied()
                    .unwrap_or(3600),
            ),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long("google-client-id")
                .help("OAuth client id accepted as Google ID token audience (repeatable)")
                .env("AUTHKEEP_GOOGLE_CLIENT_ID")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_GOOGLE_JWKS_URL)
                .long("google-jwks-url")
                .help("Where Google's signing keys are fetched from")
                .env("AUTHKEEP_GOOGLE_JWKS_URL")
                .default_value(DEFAULT_GOOGLE_JWKS_URL),
        )
        .arg(
            Arg::new(ARG_GOOGLE_JWKS_CACHE_SECONDS)
                .long("google-jwks-cache-seconds")
                .help("How long fetched Google signing keys are reused")
                .env("AUTHKEEP_GOOGLE_JWKS_CACHE_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_repeat_and_split() {
        temp_env::with_var("AUTHKEEP_GOOGLE_CLIENT_ID", None::<&str>, || {
            let matches = with_args(Command::new("test")).get_matches_from(vec![
                "test",
                "--google-client-id",
                "web.apps.googleusercontent.com,ios.apps.googleusercontent.com",
                "--google-client-id",
                "android.apps.googleusercontent.com",
            ]);
            let options = Options::parse(&matches);
            assert_eq!(
                options.google_client_ids,
                vec![
                    "web.apps.googleusercontent.com",
                    "ios.apps.googleusercontent.com",
                    "android.apps.googleusercontent.com",
                ]
            );
        });
    }

    #[test]
    fn no_client_ids_by_default() {
        temp_env::with_var("AUTHKEEP_GOOGLE_CLIENT_ID", None::<&str>, || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            let options = Options::parse(&matches);
            assert!(options.google_client_ids.is_empty());
            assert_eq!(options.google_jwks_url, DEFAULT_GOOGLE_JWKS_URL);
            assert_eq!(options.google_jwks_cache_ttl, Duration::from_secs(3600));
        });
    }

    #[test]
    fn client_ids_from_env() {
        temp_env::with_var("AUTHKEEP_GOOGLE_CLIENT_ID", Some("a,b"), || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert_eq!(Options::parse(&matches).google_client_ids, vec!["a", "b"]);
        });
    }
}
