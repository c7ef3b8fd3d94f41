//! Password history guard.
//!
//! A user's history is an ordered collection of hashes, newest first. The
//! guard only ever looks at the newest [`RETENTION`] entries, and recording a
//! change prunes everything beyond that window.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::hash::verify_password;

/// Number of most recent passwords a user may not reuse.
pub const RETENTION: usize = 3;

/// A password hash that was once active for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub password_hash: String,
    pub changed_at: DateTime<Utc>,
}

/// History of one user, ordered by `changed_at` descending (ties by `id`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordHistory {
    entries: Vec<HistoryEntry>,
}

impl PasswordHistory {
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut history = Self {
            entries: entries.into_iter().collect(),
        };
        history.sort();
        history
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    /// Hashes inside the retention window, newest first.
    pub fn recent_hashes(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .take(RETENTION)
            .map(|entry| entry.password_hash.as_str())
    }

    /// Add an entry, keeping the collection ordered.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        self.sort();
    }

    /// Drop everything but the newest `keep` entries and return what was dropped.
    pub fn prune(&mut self, keep: usize) -> Vec<HistoryEntry> {
        if self.entries.len() <= keep {
            return Vec::new();
        }
        self.entries.split_off(keep)
    }

    /// Whether `candidate` may become the user's next password.
    ///
    /// # Errors
    /// Returns an error if a stored hash cannot be parsed.
    pub fn allows(&self, candidate: &str) -> Result<bool> {
        can_change_password(candidate, self.recent_hashes())
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.changed_at
                .cmp(&a.changed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
    }
}

/// Decide whether `candidate` differs from every hash in `history_hashes`.
///
/// Hashes are expected newest first; only the first [`RETENTION`] are
/// considered. Each comparison uses the hash algorithm's verify function and
/// the check stops at the first match.
///
/// # Errors
/// Returns an error if a stored hash cannot be parsed.
pub fn can_change_password<'a, I>(candidate: &str, history_hashes: I) -> Result<bool>
where
    I: IntoIterator<Item = &'a str>,
{
    for stored_hash in history_hashes.into_iter().take(RETENTION) {
        if verify_password(candidate, stored_hash)? {
            return Ok(false);
        }
    }

    Ok(true)
}
