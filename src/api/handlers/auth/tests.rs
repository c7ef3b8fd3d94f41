//! Auth module tests against a real PostgreSQL.
//!
//! Each test starts its own container and returns early (passing) when no
//! container runtime is available.

use super::login::{LoginOutcome, authenticate};
use super::password::{PasswordChangeOutcome, rotate_password};
use super::signup::register_user;
use super::storage::SignupOutcome;
use super::types::{ChangePasswordRequest, LoginRequest, SignupRequest};
use super::AuthConfig;
use crate::api;
use crate::password::verify_password;
use crate::test_support::postgres::PostgresContainer;
use anyhow::{Context, Result, bail};
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use chrono::NaiveDate;
use serde_json::{Value, json};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use tower::ServiceExt;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const TEST_COST: u32 = 4;

struct TestDb {
    _postgres: PostgresContainer,
    pool: PgPool,
}

impl TestDb {
    async fn new() -> Result<Self> {
        let postgres = match PostgresContainer::start().await {
            Ok(postgres) => postgres,
            Err(err) => {
                eprintln!("Skipping integration test: {err:#}");
                return Err(err);
            }
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&postgres.dsn())
            .await
            .context("failed to connect test pool")?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to apply schema")?;

        Ok(Self {
            _postgres: postgres,
            pool,
        })
    }
}

fn signup_request(username: &str, password: &str) -> SignupRequest {
    SignupRequest {
        username: username.to_string(),
        password: password.to_string(),
        name: Some("Alice Kim".to_string()),
        birth: NaiveDate::from_ymd_opt(1990, 4, 2),
        pnum: Some("010-1234-5678".to_string()),
        email: Some(format!("{username}@passkeep.dev")),
    }
}

fn change_request(username: &str, current: &str, new: &str) -> ChangePasswordRequest {
    ChangePasswordRequest {
        username: username.to_string(),
        current_password: current.to_string(),
        new_password: new.to_string(),
    }
}

async fn create_user(pool: &PgPool, username: &str, password: &str) -> Result<i64> {
    match register_user(pool, &signup_request(username, password), TEST_COST).await? {
        SignupOutcome::Created(user_id) => Ok(user_id),
        SignupOutcome::Conflict => bail!("user {username} already exists"),
    }
}

async fn change(
    pool: &PgPool,
    username: &str,
    current: &str,
    new: &str,
) -> Result<PasswordChangeOutcome> {
    rotate_password(pool, &change_request(username, current, new), TEST_COST).await
}

async fn stored_hash(pool: &PgPool, username: &str) -> Result<String> {
    let row = sqlx::query("SELECT password_hash FROM users WHERE username = $1")
        .bind(username)
        .fetch_one(pool)
        .await?;
    Ok(row.get("password_hash"))
}

/// History hashes for the user, newest first.
async fn history_hashes(pool: &PgPool, user_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT password_hash FROM password_history WHERE user_id = $1 ORDER BY changed_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("password_hash")).collect())
}

/// POST `body` to `uri` through the assembled router and return status and JSON.
async fn post(pool: &PgPool, uri: &str, body: &Value) -> Result<(StatusCode, Value)> {
    let app = api::app(pool.clone(), AuthConfig::new().with_bcrypt_cost(TEST_COST));
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?;

    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

async fn post_change(
    pool: &PgPool,
    username: &str,
    current: &str,
    new: &str,
) -> Result<(StatusCode, Value)> {
    post(
        pool,
        "/api/changepassword",
        &json!({ "username": username, "currentPassword": current, "newPassword": new }),
    )
    .await
}

async fn count_users(pool: &PgPool, username: &str) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE username = $1")
        .bind(username)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

#[tokio::test]
async fn signup_creates_user_and_first_history_entry() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "alice", "P1!").await?;

    let current = stored_hash(&db.pool, "alice").await?;
    assert!(verify_password("P1!", &current)?);

    let history = history_hashes(&db.pool, user_id).await?;
    assert_eq!(history, vec![current]);
    Ok(())
}

#[tokio::test]
async fn signup_duplicate_username_conflicts() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "alice", "P1!").await?;
    let outcome = register_user(&db.pool, &signup_request("alice", "other"), TEST_COST).await?;

    assert_eq!(outcome, SignupOutcome::Conflict);
    assert_eq!(count_users(&db.pool, "alice").await?, 1);
    assert_eq!(history_hashes(&db.pool, user_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn login_returns_profile_without_hash() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    create_user(&db.pool, "alice", "P1!").await?;
    let request = LoginRequest {
        username: "alice".to_string(),
        password: "P1!".to_string(),
    };

    let LoginOutcome::Authenticated(profile) =
        authenticate(&db.pool, &request, TEST_COST).await?
    else {
        bail!("expected login to succeed");
    };
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.name.as_deref(), Some("Alice Kim"));
    assert_eq!(profile.birth, NaiveDate::from_ymd_opt(1990, 4, 2));
    assert_eq!(profile.email.as_deref(), Some("alice@passkeep.dev"));

    let body = serde_json::to_value(&profile)?;
    assert!(body.get("password_hash").is_none());
    assert!(body.get("created_at").is_some());
    Ok(())
}

#[tokio::test]
async fn login_rejections_are_indistinguishable() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    create_user(&db.pool, "alice", "P1!").await?;

    let wrong_password = LoginRequest {
        username: "alice".to_string(),
        password: "nope".to_string(),
    };
    let unknown_user = LoginRequest {
        username: "mallory".to_string(),
        password: "P1!".to_string(),
    };

    assert_eq!(
        authenticate(&db.pool, &wrong_password, TEST_COST).await?,
        LoginOutcome::InvalidCredentials
    );
    assert_eq!(
        authenticate(&db.pool, &unknown_user, TEST_COST).await?,
        LoginOutcome::InvalidCredentials
    );
    Ok(())
}

#[tokio::test]
async fn change_password_unknown_user() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let outcome = change(&db.pool, "ghost", "P1!", "P2!").await?;
    assert_eq!(outcome, PasswordChangeOutcome::UserNotFound);
    Ok(())
}

#[tokio::test]
async fn change_password_wrong_current_leaves_state_untouched() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "alice", "P1!").await?;
    let before_hash = stored_hash(&db.pool, "alice").await?;
    let before_history = history_hashes(&db.pool, user_id).await?;

    let outcome = change(&db.pool, "alice", "wrong", "P2!").await?;

    assert_eq!(outcome, PasswordChangeOutcome::InvalidCredentials);
    assert_eq!(stored_hash(&db.pool, "alice").await?, before_hash);
    assert_eq!(history_hashes(&db.pool, user_id).await?, before_history);
    Ok(())
}

#[tokio::test]
async fn change_password_reuse_window_scenario() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    create_user(&db.pool, "alice", "P1!").await?;

    assert_eq!(
        change(&db.pool, "alice", "P1!", "P2!").await?,
        PasswordChangeOutcome::Changed
    );
    assert_eq!(
        change(&db.pool, "alice", "P2!", "P1!").await?,
        PasswordChangeOutcome::PasswordReused
    );
    assert_eq!(
        change(&db.pool, "alice", "P2!", "P3!").await?,
        PasswordChangeOutcome::Changed
    );
    assert_eq!(
        change(&db.pool, "alice", "P3!", "P4!").await?,
        PasswordChangeOutcome::Changed
    );
    // P1 is no longer among the last three.
    assert_eq!(
        change(&db.pool, "alice", "P4!", "P1!").await?,
        PasswordChangeOutcome::Changed
    );

    let current = stored_hash(&db.pool, "alice").await?;
    assert!(verify_password("P1!", &current)?);
    Ok(())
}

#[tokio::test]
async fn change_password_keeps_history_bounded() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "bob", "pw-0").await?;
    for round in 1..=5 {
        let current = format!("pw-{}", round - 1);
        let next = format!("pw-{round}");
        assert_eq!(
            change(&db.pool, "bob", &current, &next).await?,
            PasswordChangeOutcome::Changed
        );

        let history = history_hashes(&db.pool, user_id).await?;
        assert!(history.len() <= 3, "history grew to {}", history.len());
        assert_eq!(history.first(), Some(&stored_hash(&db.pool, "bob").await?));
    }

    let history = history_hashes(&db.pool, user_id).await?;
    assert_eq!(history.len(), 3);
    assert!(verify_password("pw-5", &history[0])?);
    assert!(verify_password("pw-4", &history[1])?);
    assert!(verify_password("pw-3", &history[2])?);
    Ok(())
}

#[tokio::test]
async fn concurrent_changes_for_one_user_are_serialized() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "carol", "P1!").await?;

    // Both requests present the same current password; whichever runs second
    // sees the new hash and fails verification.
    let first = {
        let pool = db.pool.clone();
        tokio::spawn(async move { change(&pool, "carol", "P1!", "P2!").await })
    };
    let second = {
        let pool = db.pool.clone();
        tokio::spawn(async move { change(&pool, "carol", "P1!", "P3!").await })
    };

    let outcomes = [first.await??, second.await??];
    let changed = outcomes
        .iter()
        .filter(|outcome| **outcome == PasswordChangeOutcome::Changed)
        .count();
    assert_eq!(changed, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.contains(&PasswordChangeOutcome::InvalidCredentials));

    let history = history_hashes(&db.pool, user_id).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history.first(), Some(&stored_hash(&db.pool, "carol").await?));
    Ok(())
}

#[tokio::test]
async fn http_signup_and_login() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let signup = json!({
        "username": "alice",
        "password": "P1!",
        "name": "Alice Kim",
        "birth": "1990-04-02T00:00:00.000Z",
        "pnum": "010-1234-5678",
        "email": "alice@passkeep.dev"
    });

    let (status, body) = post(&db.pool, "/api/signup", &signup).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Signup successful");
    assert!(body["userId"].as_i64().is_some_and(|id| id > 0), "{body}");

    let (status, body) = post(&db.pool, "/api/signup", &signup).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({ "error": "Username already exists" }));

    let (status, body) = post(
        &db.pool,
        "/api/login",
        &json!({ "username": "alice", "password": "P1!" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    let user = body["user"].as_object().context("user object")?;
    assert_eq!(user.get("username"), Some(&json!("alice")));
    assert_eq!(user.get("birth"), Some(&json!("1990-04-02")));
    assert!(user.contains_key("created_at"));
    assert!(!user.keys().any(|key| key.contains("password")));

    for credentials in [
        json!({ "username": "alice", "password": "nope" }),
        json!({ "username": "mallory", "password": "P1!" }),
    ] {
        let (status, body) = post(&db.pool, "/api/login", &credentials).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid username or password" }));
    }
    Ok(())
}

#[tokio::test]
async fn http_change_password_responses() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "alice", "P1!").await?;

    let (status, body) = post_change(&db.pool, "ghost", "P1!", "P2!").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "User not found" }));

    let (status, body) = post_change(&db.pool, "alice", "wrong", "P2!").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Current password is incorrect" }));

    let changed = json!({ "message": "Password changed successfully" });
    let reused = json!({ "error": "New password must differ from the last 3 passwords" });

    let steps = [
        ("P1!", "P2!", StatusCode::OK, &changed),
        ("P2!", "P1!", StatusCode::BAD_REQUEST, &reused),
        ("P2!", "P3!", StatusCode::OK, &changed),
        ("P3!", "P4!", StatusCode::OK, &changed),
        ("P4!", "P1!", StatusCode::OK, &changed),
        ("P1!", "P4!", StatusCode::BAD_REQUEST, &reused),
    ];
    for (current, new, expected_status, expected_body) in steps {
        let (status, body) = post_change(&db.pool, "alice", current, new).await?;
        assert_eq!(status, expected_status, "{current} -> {new}");
        assert_eq!(&body, expected_body, "{current} -> {new}");
    }

    assert_eq!(history_hashes(&db.pool, user_id).await?.len(), 3);
    assert!(verify_password("P1!", &stored_hash(&db.pool, "alice").await?)?);
    Ok(())
}

#[tokio::test]
async fn http_concurrent_changes_yield_one_success() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    create_user(&db.pool, "dave", "P1!").await?;

    let tasks: Vec<_> = (0..6)
        .map(|attempt| {
            let pool = db.pool.clone();
            tokio::spawn(async move {
                post_change(&pool, "dave", "P1!", &format!("next-{attempt}")).await
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await??.0);
    }

    let ok = statuses.iter().filter(|status| **status == StatusCode::OK).count();
    assert_eq!(ok, 1, "statuses: {statuses:?}");
    assert!(statuses
        .iter()
        .all(|status| *status == StatusCode::OK || *status == StatusCode::BAD_REQUEST));
    Ok(())
}
