//! Password hashing and the reuse-prevention history.

pub mod hash;
pub mod history;

pub use hash::{DEFAULT_COST, hash_password, verify_password};
pub use history::{HistoryEntry, PasswordHistory, RETENTION, can_change_password};
