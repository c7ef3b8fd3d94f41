//! Database helpers for users and password history.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Instrument, debug};

use super::utils::is_unique_violation;
use crate::password::{HistoryEntry, PasswordHistory, RETENTION};

/// Outcome when attempting to create a new user + first history entry.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum SignupOutcome {
    Created(i64),
    Conflict,
}

/// Fields needed to create a user row.
pub(super) struct NewUser<'a> {
    pub(super) username: &'a str,
    pub(super) password_hash: &'a str,
    pub(super) name: Option<&'a str>,
    pub(super) birth: Option<NaiveDate>,
    pub(super) pnum: Option<&'a str>,
    pub(super) email: Option<&'a str>,
}

/// Full user row, as read for login.
pub(super) struct UserRecord {
    pub(super) id: i64,
    pub(super) username: String,
    pub(super) password_hash: String,
    pub(super) name: Option<String>,
    pub(super) birth: Option<NaiveDate>,
    pub(super) pnum: Option<String>,
    pub(super) email: Option<String>,
    pub(super) created_at: DateTime<Utc>,
}

/// Minimal fields needed to change a password.
pub(super) struct Credentials {
    pub(super) user_id: i64,
    pub(super) password_hash: String,
}

pub(super) async fn insert_user_with_history(
    pool: &PgPool,
    user: &NewUser<'_>,
) -> Result<SignupOutcome> {
    // User row and its first history entry are created together or not at all.
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users
            (username, password_hash, name, birth, pnum, email, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user.username)
        .bind(user.password_hash)
        .bind(user.name)
        .bind(user.birth)
        .bind(user.pnum)
        .bind(user.email)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: i64 = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    insert_history_entry(&mut tx, user_id, user.password_hash).await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created(user_id))
}

pub(super) async fn lookup_user(pool: &PgPool, username: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, username, password_hash, name, birth, pnum, email, created_at
        FROM users
        WHERE username = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        birth: row.get("birth"),
        pnum: row.get("pnum"),
        email: row.get("email"),
        created_at: row.get("created_at"),
    }))
}

/// Read the user's credentials and hold a row lock until the transaction ends.
///
/// Every password change takes this lock first, so changes for one user run
/// one after another and each sees the history left by the previous one.
pub(super) async fn lock_credentials(
    tx: &mut Transaction<'_, Postgres>,
    username: &str,
) -> Result<Option<Credentials>> {
    let query = "SELECT id, password_hash FROM users WHERE username = $1 FOR UPDATE";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lock user credentials")?;

    Ok(row.map(|row| Credentials {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
    }))
}

pub(super) async fn load_history(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
) -> Result<PasswordHistory> {
    let query = r"
        SELECT id, password_hash, changed_at
        FROM password_history
        WHERE user_id = $1
        ORDER BY changed_at DESC, id DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(&mut **tx)
        .instrument(span)
        .await
        .context("failed to load password history")?;

    Ok(PasswordHistory::new(rows.into_iter().map(|row| {
        HistoryEntry {
            id: row.get("id"),
            password_hash: row.get("password_hash"),
            changed_at: row.get("changed_at"),
        }
    })))
}

/// Make `new_hash` the current password and roll the history window forward.
///
/// Must run in the transaction that holds the lock from [`lock_credentials`]
/// and after the reuse check passed. `history` is the value returned by
/// [`load_history`]; on return it reflects what is stored. Returns the number
/// of pruned history rows.
pub(super) async fn record_password_change(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    new_hash: &str,
    history: &mut PasswordHistory,
) -> Result<u64> {
    let query = "UPDATE users SET password_hash = $1 WHERE id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(new_hash)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    let entry = insert_history_entry(tx, user_id, new_hash).await?;
    history.push(entry);

    let pruned: Vec<i64> = history
        .prune(RETENTION)
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    if pruned.is_empty() {
        return Ok(0);
    }

    let query = "DELETE FROM password_history WHERE user_id = $1 AND id = ANY($2)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(&pruned)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to prune password history")?;

    debug!(user_id, pruned = result.rows_affected(), "pruned password history");

    Ok(result.rows_affected())
}

async fn insert_history_entry(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    password_hash: &str,
) -> Result<HistoryEntry> {
    // clock_timestamp() rather than NOW(): a change that waited on the row lock
    // must sort after the change it waited for, whatever its transaction start.
    let query = r"
        INSERT INTO password_history (user_id, password_hash, changed_at)
        VALUES ($1, $2, clock_timestamp())
        RETURNING id, password_hash, changed_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert password history entry")?;

    Ok(HistoryEntry {
        id: row.get("id"),
        password_hash: row.get("password_hash"),
        changed_at: row.get("changed_at"),
    })
}
