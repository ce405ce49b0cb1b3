use crate::engine::{
    config::{
        DEFAULT_LOGIN_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_WINDOW_SECONDS, DEFAULT_REFRESH_MAX_ATTEMPTS,
    },
    rate_limit::{RateLimitKeyScope, RateLimitPolicy},
};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_RATE_LIMIT_SCOPE: &str = "rate-limit-scope";
pub const ARG_LOGIN_MAX_ATTEMPTS: &str = "login-max-attempts";
pub const ARG_LOGIN_WINDOW_SECONDS: &str = "login-window-seconds";
pub const ARG_REFRESH_MAX_ATTEMPTS: &str = "refresh-max-attempts";
pub const ARG_REFRESH_WINDOW_SECONDS: &str = "refresh-window-seconds";
pub const ARG_RATE_LIMIT_CLEAR_ON_SUCCESS: &str = "rate-limit-clear-on-success";

#[derive(Debug)]
pub struct Options {
    pub scope: RateLimitKeyScope,
    pub login: RateLimitPolicy,
    /// Applied to both refresh and logout.
    pub refresh: RateLimitPolicy,
    pub clear_on_success: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let policy = |attempts: &str, window: &str, default_attempts: u32| {
            RateLimitPolicy::new(
                matches
                    .get_one::<u32>(attempts)
                    .copied()
                    .unwrap_or(default_attempts),
                Duration::from_secs(
                    matches
                        .get_one::<u64>(window)
                        .copied()
                        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
                ),
            )
        };

        Self {
            scope: matches
                .get_one::<RateLimitKeyScope>(ARG_RATE_LIMIT_SCOPE)
                .copied()
                .unwrap_or(RateLimitKeyScope::Combined),
            login: policy(
                ARG_LOGIN_MAX_ATTEMPTS,
                ARG_LOGIN_WINDOW_SECONDS,
                DEFAULT_LOGIN_MAX_ATTEMPTS,
            ),
            refresh: policy(
                ARG_REFRESH_MAX_ATTEMPTS,
                ARG_REFRESH_WINDOW_SECONDS,
                DEFAULT_REFRESH_MAX_ATTEMPTS,
            ),
            clear_on_success: matches
                .get_one::<bool>(ARG_RATE_LIMIT_CLEAR_ON_SUCCESS)
                .copied()
                .unwrap_or(true),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_SCOPE)
                .long("rate-limit-scope")
                .help("Login buckets: per client address, per account, or both")
                .env("AUTHKEEP_RATE_LIMIT_SCOPE")
                .default_value("combined")
                .value_parser(|value: &str| value.parse::<RateLimitKeyScope>()),
        )
        .arg(
            Arg::new(ARG_LOGIN_MAX_ATTEMPTS)
                .long("login-max-attempts")
                .help("Login attempts allowed per window")
                .env("AUTHKEEP_LOGIN_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_WINDOW_SECONDS)
                .long("login-window-seconds")
                .help("Login rate-limit window in seconds")
                .env("AUTHKEEP_LOGIN_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_MAX_ATTEMPTS)
                .long("refresh-max-attempts")
                .help("Refresh and logout attempts allowed per window")
                .env("AUTHKEEP_REFRESH_MAX_ATTEMPTS")
                .default_value("30")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_WINDOW_SECONDS)
                .long("refresh-window-seconds")
                .help("Refresh and logout rate-limit window in seconds")
                .env("AUTHKEEP_REFRESH_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_CLEAR_ON_SUCCESS)
                .long("rate-limit-clear-on-success")
                .help("Reset login buckets after a successful login")
                .env("AUTHKEEP_RATE_LIMIT_CLEAR_ON_SUCCESS")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}
