use crate::engine::hasher::{DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB, DEFAULT_PARALLELISM};
use clap::{Arg, ArgMatches, Command};

pub const ARG_PASSWORD_HASH_MEMORY_KIB: &str = "password-hash-memory-kib";
pub const ARG_PASSWORD_HASH_ITERATIONS: &str = "password-hash-iterations";
pub const ARG_PASSWORD_HASH_PARALLELISM: &str = "password-hash-parallelism";

/// argon2id cost parameters for new digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let get = |id: &str, default: u32| matches.get_one::<u32>(id).copied().unwrap_or(default);
        Self {
            memory_kib: get(ARG_PASSWORD_HASH_MEMORY_KIB, DEFAULT_MEMORY_KIB),
            iterations: get(ARG_PASSWORD_HASH_ITERATIONS, DEFAULT_ITERATIONS),
            parallelism: get(ARG_PASSWORD_HASH_PARALLELISM, DEFAULT_PARALLELISM),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PASSWORD_HASH_MEMORY_KIB)
                .long("password-hash-memory-kib")
                .help("argon2id memory cost in KiB")
                .env("AUTHKEEP_PASSWORD_HASH_MEMORY_KIB")
                .default_value("19456")
                .value_parser(clap::value_parser!(u32).range(8..)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_HASH_ITERATIONS)
                .long("password-hash-iterations")
                .help("argon2id time cost")
                .env("AUTHKEEP_PASSWORD_HASH_ITERATIONS")
                .default_value("2")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_HASH_PARALLELISM)
                .long("password-hash-parallelism")
                .help("argon2id lanes")
                .env("AUTHKEEP_PASSWORD_HASH_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
