//! # Passkeep
//!
//! `passkeep` is a small authentication backend: user registration, login and
//! password change against PostgreSQL, exposed as three JSON endpoints under
//! `/api`.
//!
//! ## Password history
//!
//! Every password a user sets is recorded in `password_history`. A new
//! password is rejected when it matches any of the user's last
//! [`password::history::RETENTION`] passwords; older entries are pruned in the
//! same transaction that records the change, so the history never grows past
//! the window.
//!
//! Password changes for one user are serialized by a row lock on `users`, so
//! two concurrent requests can never both pass the reuse check against stale
//! history.

pub mod api;
pub mod cli;
pub mod password;

#[cfg(test)]
mod test_support;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
