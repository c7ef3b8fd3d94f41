//! `POST /api/signup`.

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
    storage::{NewUser, SignupOutcome, insert_user_with_history},
    types::{ErrorResponse, SignupRequest, SignupResponse},
    utils::{MISSING_PAYLOAD, error_response},
};
use crate::password::hash::hash_password_blocking;

const SIGNUP_OK: &str = "Signup successful";
const SIGNUP_CONFLICT: &str = "Username already exists";
const SIGNUP_FAILED: &str = "Signup failed";

#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = SignupResponse),
        (status = 400, description = "Missing or invalid payload", body = ErrorResponse),
        (status = 409, description = "Username already exists", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    pool: Extension<PgPool>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Option<Json<SignupRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD);
    };

    debug!("signup: {:?}", request);

    match register_user(&pool, &request, auth_config.bcrypt_cost()).await {
        Ok(SignupOutcome::Created(user_id)) => (
            StatusCode::CREATED,
            Json(SignupResponse {
                message: SIGNUP_OK.to_string(),
                user_id,
            }),
        )
            .into_response(),
        Ok(SignupOutcome::Conflict) => {
            debug!(username = %request.username, "username already taken");
            error_response(StatusCode::CONFLICT, SIGNUP_CONFLICT)
        }
        Err(err) => {
            error!("Signup failed: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, SIGNUP_FAILED)
        }
    }
}

/// Hash the password and create the user with its first history entry.
pub(super) async fn register_user(
    pool: &PgPool,
    request: &SignupRequest,
    cost: u32,
) -> Result<SignupOutcome> {
    let password_hash = hash_password_blocking(request.password.clone(), cost).await?;

    let user = NewUser {
        username: &request.username,
        password_hash: &password_hash,
        name: request.name.as_deref(),
        birth: request.birth,
        pnum: request.pnum.as_deref(),
        email: request.email.as_deref(),
    };

    insert_user_with_history(pool, &user).await
}
