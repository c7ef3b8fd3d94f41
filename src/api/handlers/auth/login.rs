//! `POST /api/login`.
//!
//! Unknown usernames and wrong passwords produce the same response so the
//! endpoint does not reveal which accounts exist. An unknown username still
//! pays for one bcrypt round at the configured cost, so response time does not
//! give it away either.

use anyhow::Result;
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
    storage::lookup_user,
    types::{ErrorResponse, LoginRequest, LoginResponse, UserProfile},
    utils::{MISSING_PAYLOAD, error_response},
};
use crate::password::hash::{hash_password_blocking, verify_password_blocking};

const LOGIN_OK: &str = "Login successful";
const LOGIN_INVALID: &str = "Invalid username or password";
const LOGIN_FAILED: &str = "Login failed";

#[derive(Debug, PartialEq, Eq)]
pub(super) enum LoginOutcome {
    Authenticated(UserProfile),
    InvalidCredentials,
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid username or password", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD);
    };

    debug!("login: {:?}", request);

    match authenticate(&pool, &request, auth_config.bcrypt_cost()).await {
        Ok(LoginOutcome::Authenticated(user)) => (
            StatusCode::OK,
            Json(LoginResponse {
                message: LOGIN_OK.to_string(),
                user,
            }),
        )
            .into_response(),
        Ok(LoginOutcome::InvalidCredentials) => {
            error_response(StatusCode::BAD_REQUEST, LOGIN_INVALID)
        }
        Err(err) => {
            error!("Login failed: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, LOGIN_FAILED)
        }
    }
}

pub(super) async fn authenticate(
    pool: &PgPool,
    request: &LoginRequest,
    cost: u32,
) -> Result<LoginOutcome> {
    let Some(user) = lookup_user(pool, &request.username).await? else {
        debug!("User not found");
        decoy_verify(request.password.clone(), cost).await?;
        return Ok(LoginOutcome::InvalidCredentials);
    };

    if !verify_password_blocking(request.password.clone(), user.password_hash).await? {
        debug!(user_id = user.id, "password mismatch");
        return Ok(LoginOutcome::InvalidCredentials);
    }

    debug!(user_id = user.id, "login successful");

    Ok(LoginOutcome::Authenticated(UserProfile {
        username: user.username,
        name: user.name,
        birth: user.birth,
        pnum: user.pnum,
        email: user.email,
        created_at: user.created_at,
    }))
}

/// Burn the same bcrypt work a real verification would; never matches.
async fn decoy_verify(password: String, cost: u32) -> Result<bool> {
    hash_password_blocking(password, cost).await?;
    Ok(false)
}
