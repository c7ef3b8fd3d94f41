//! `POST /api/changepassword`.
//!
//! The whole check-then-record sequence runs in one transaction that starts by
//! locking the user row. Every rejection rolls back, so a refused change
//! leaves the stored hash and history exactly as they were.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    state::AuthConfig,
    storage::{load_history, lock_credentials, record_password_change},
    types::{ChangePasswordRequest, ErrorResponse, MessageResponse},
    utils::{MISSING_PAYLOAD, error_response},
};
use crate::password::{
    PasswordHistory,
    hash::{hash_password_blocking, verify_password_blocking},
};

const CHANGE_OK: &str = "Password changed successfully";
const CHANGE_NOT_FOUND: &str = "User not found";
const CHANGE_WRONG_CURRENT: &str = "Current password is incorrect";
const CHANGE_REUSED: &str = "New password must differ from the last 3 passwords";
const CHANGE_FAILED: &str = "Password change failed";

#[derive(Debug, PartialEq, Eq)]
pub(super) enum PasswordChangeOutcome {
    Changed,
    UserNotFound,
    InvalidCredentials,
    PasswordReused,
}

#[utoipa::path(
    post,
    path = "/api/changepassword",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password wrong or new password recently used", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn change_password(
    pool: Extension<PgPool>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD);
    };

    debug!("change password: {:?}", request);

    match rotate_password(&pool, &request, auth_config.bcrypt_cost()).await {
        Ok(PasswordChangeOutcome::Changed) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: CHANGE_OK.to_string(),
            }),
        )
            .into_response(),
        Ok(PasswordChangeOutcome::UserNotFound) => {
            error_response(StatusCode::NOT_FOUND, CHANGE_NOT_FOUND)
        }
        Ok(PasswordChangeOutcome::InvalidCredentials) => {
            error_response(StatusCode::BAD_REQUEST, CHANGE_WRONG_CURRENT)
        }
        Ok(PasswordChangeOutcome::PasswordReused) => {
            error_response(StatusCode::BAD_REQUEST, CHANGE_REUSED)
        }
        Err(err) => {
            error!("Password change failed: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, CHANGE_FAILED)
        }
    }
}

pub(super) async fn rotate_password(
    pool: &PgPool,
    request: &ChangePasswordRequest,
    cost: u32,
) -> Result<PasswordChangeOutcome> {
    let mut tx = pool
        .begin()
        .await
        .context("begin password change transaction")?;

    let Some(credentials) = lock_credentials(&mut tx, &request.username).await? else {
        debug!("User not found");
        tx.rollback().await.context("rollback password change")?;
        return Ok(PasswordChangeOutcome::UserNotFound);
    };

    let current_matches = verify_password_blocking(
        request.current_password.clone(),
        credentials.password_hash,
    )
    .await?;
    if !current_matches {
        debug!(user_id = credentials.user_id, "current password mismatch");
        tx.rollback().await.context("rollback password change")?;
        return Ok(PasswordChangeOutcome::InvalidCredentials);
    }

    let mut history = load_history(&mut tx, credentials.user_id).await?;
    if !history_allows(&history, &request.new_password).await? {
        debug!(user_id = credentials.user_id, "new password found in history");
        tx.rollback().await.context("rollback password change")?;
        return Ok(PasswordChangeOutcome::PasswordReused);
    }

    let new_hash = hash_password_blocking(request.new_password.clone(), cost).await?;
    record_password_change(&mut tx, credentials.user_id, &new_hash, &mut history).await?;

    tx.commit().await.context("commit password change")?;

    debug!(user_id = credentials.user_id, "password changed");

    Ok(PasswordChangeOutcome::Changed)
}

/// Run the history guard on the blocking pool; it may verify up to three hashes.
async fn history_allows(history: &PasswordHistory, candidate: &str) -> Result<bool> {
    let history = history.clone();
    let candidate = candidate.to_string();
    tokio::task::spawn_blocking(move || history.allows(&candidate))
        .await
        .context("password history task failed")?
}
