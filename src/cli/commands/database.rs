use clap::{Arg, ArgGroup, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_HOST: &str = "db-host";
pub const ARG_DB_PORT: &str = "db-port";
pub const ARG_DB_USER: &str = "db-user";
pub const ARG_DB_PASSWORD: &str = "db-password";
pub const ARG_DB_NAME: &str = "db-name";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";

/// Database connection arguments.
///
/// Either a full DSN or the `DB_*` parts; user and password override the
/// DSN's credentials when both are given.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("PASSKEEP_DSN"),
        )
        .arg(
            Arg::new(ARG_DB_HOST)
                .long("db-host")
                .help("Database host, used when no DSN is given")
                .env("DB_HOST")
                .default_value("localhost"),
        )
        .arg(
            Arg::new(ARG_DB_PORT)
                .long("db-port")
                .help("Database port, used when no DSN is given")
                .env("DB_PORT")
                .default_value("5432")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DB_USER)
                .long("db-user")
                .help("Database user")
                .env("DB_USER"),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long("db-password")
                .help("Database password")
                .env("DB_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_NAME)
                .long("db-name")
                .help("Database name, used when no DSN is given")
                .env("DB_NAME"),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long("db-max-connections")
                .help("Maximum number of pooled database connections")
                .env("PASSKEEP_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .group(
            ArgGroup::new("database")
                .args([ARG_DSN, ARG_DB_NAME])
                .required(true)
                .multiple(true),
        )
}
