pub mod hasher;
pub mod logging;
pub mod provider;
pub mod rate_limit;
pub mod tokens;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};
use std::net::IpAddr;

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_HOUSEKEEPING_INTERVAL_SECONDS: &str = "housekeeping-interval-seconds";
pub const ARG_DEV_ACCOUNT: &str = "dev-account";
pub const ARG_TRUSTED_PROXY: &str = "trusted-proxy";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("authkeep")
        .about("Credential verification and token lifecycle")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AUTHKEEP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "Postgres connection string. Without it accounts and refresh tokens live in memory and are lost on restart.",
                )
                .env("AUTHKEEP_DSN"),
        )
        .arg(
            Arg::new(ARG_HOUSEKEEPING_INTERVAL_SECONDS)
                .long("housekeeping-interval-seconds")
                .help("Interval between purges of expired refresh tokens and rate-limit buckets")
                .env("AUTHKEEP_HOUSEKEEPING_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_DEV_ACCOUNT)
                .long("dev-account")
                .help("Seed a password account as EMAIL:PASSWORD (in-memory mode only)")
                .env("AUTHKEEP_DEV_ACCOUNT")
                .conflicts_with(ARG_DSN),
        )
        .arg(
            Arg::new(ARG_TRUSTED_PROXY)
                .long("trusted-proxy")
                .help("Proxy address allowed to set x-forwarded-for (repeatable or comma separated)")
                .long_help(
                    "Address of a reverse proxy in front of the service. Only requests whose TCP peer is listed here may name the client in x-forwarded-for or x-real-ip; for every other peer the connection address is the client.",
                )
                .env("AUTHKEEP_TRUSTED_PROXY")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .value_parser(clap::value_parser!(IpAddr)),
        );

    let command = tokens::with_args(command);
    let command = rate_limit::with_args(command);
    let command = provider::with_args(command);
    let command = hasher::with_args(command);
    logging::with_args(command)
}
