//! Container helpers shared by the database tests.

pub mod postgres;
pub mod runtime;

/// Name a container so parallel test runs never collide.
pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", ulid::Ulid::new().to_string().to_lowercase())
}
