//! Auth handlers and supporting modules.
//!
//! Signup, login and password change. Handlers stay thin: each one parses the
//! payload, calls a flow function returning an outcome enum, and maps the
//! outcome to a status code and JSON body. Storage and hashing failures come
//! back as errors and always become a generic `500`.

pub(crate) mod login;
pub(crate) mod password;
pub(crate) mod signup;
mod state;
mod storage;
pub(crate) mod types;
mod utils;

pub use state::AuthConfig;

#[cfg(test)]
mod tests;
