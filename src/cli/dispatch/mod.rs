//! Map parsed CLI arguments to an [`Action`].
//!
//! The database DSN is settled here: a given DSN is used as-is unless
//! `--db-user` / `--db-password` override its credentials, otherwise it is
//! assembled from the `DB_*` parts.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_PORT, auth, database};
use anyhow::{Context, Result, anyhow};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if the database arguments do not form a valid DSN.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(5000);

    let dsn = build_dsn(&DatabaseOptions::parse(matches))?;

    let max_connections = matches
        .get_one::<u32>(database::ARG_DB_MAX_CONNECTIONS)
        .copied()
        .unwrap_or(5);
    let bcrypt_cost = matches
        .get_one::<u32>(auth::ARG_BCRYPT_COST)
        .copied()
        .unwrap_or(crate::password::DEFAULT_COST);

    Ok(Action::Server(Args {
        port,
        dsn,
        max_connections,
        bcrypt_cost,
    }))
}

#[derive(Debug, Default)]
struct DatabaseOptions {
    dsn: Option<String>,
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<SecretString>,
    name: Option<String>,
}

impl DatabaseOptions {
    fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            dsn: matches.get_one::<String>(database::ARG_DSN).cloned(),
            host: matches
                .get_one::<String>(database::ARG_DB_HOST)
                .cloned()
                .unwrap_or_else(|| "localhost".to_string()),
            port: matches
                .get_one::<u16>(database::ARG_DB_PORT)
                .copied()
                .unwrap_or(5432),
            user: matches.get_one::<String>(database::ARG_DB_USER).cloned(),
            password: matches
                .get_one::<String>(database::ARG_DB_PASSWORD)
                .map(|password| SecretString::from(password.clone())),
            name: matches.get_one::<String>(database::ARG_DB_NAME).cloned(),
        }
    }
}

fn build_dsn(options: &DatabaseOptions) -> Result<SecretString> {
    let mut dsn = if let Some(dsn) = &options.dsn {
        Url::parse(dsn).context("Invalid database DSN")?
    } else {
        let name = options
            .name
            .as_deref()
            .context("missing required argument: --dsn or --db-name")?;
        Url::parse(&format!(
            "postgres://{}:{}/{}",
            options.host, options.port, name
        ))
        .context("Invalid database host, port or name")?
    };

    if let Some(user) = &options.user {
        dsn.set_username(user)
            .map_err(|()| anyhow!("Error setting username"))?;
    }

    if let Some(password) = &options.password {
        dsn.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting password"))?;
    }

    Ok(SecretString::from(dsn.to_string()))
}
