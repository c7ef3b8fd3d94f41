//! Salted one-way password hashing (bcrypt).
//!
//! Hashes are stored in the modular crypt format (`$2b$<cost>$...`), so rows
//! written by earlier deployments with the same algorithm keep verifying.
//! Both operations are CPU-bound; request handlers call the `_blocking`
//! variants, which move the work onto tokio's blocking pool.

use anyhow::{Context, Result};

/// Work factor used when none is configured.
pub const DEFAULT_COST: u32 = 10;

/// Hash a plaintext password with a fresh random salt.
///
/// # Errors
/// Returns an error if `cost` is outside the range bcrypt accepts.
pub fn hash_password(plain_text_password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(plain_text_password, cost).context("failed to hash password")
}

/// Check a plaintext password against a stored hash.
///
/// # Errors
/// Returns an error if `stored_hash` is not a valid bcrypt hash.
pub fn verify_password(plain_text_password: &str, stored_hash: &str) -> Result<bool> {
    bcrypt::verify(plain_text_password, stored_hash).context("failed to verify password hash")
}

/// [`hash_password`] on the blocking thread pool.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_password_blocking(plain_text_password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain_text_password, cost))
        .await
        .context("password hashing task failed")?
}

/// [`verify_password`] on the blocking thread pool.
///
/// # Errors
/// Returns an error if the stored hash is malformed or the blocking task panics.
pub async fn verify_password_blocking(
    plain_text_password: String,
    stored_hash: String,
) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain_text_password, &stored_hash))
        .await
        .context("password verification task failed")?
}
