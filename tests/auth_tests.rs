//! Authentication tests: the request extractor and the login lifecycle

mod common;

use axum::extract::FromRequestParts;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::response::IntoResponse;
use common::{ScriptedGenerator, app_state, auth_gateway, setup_test_db};
use pdf_tutor_api::api::ExtractUser;
use pdf_tutor_api::core::errors::AuthError;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_extract_user_valid_bearer() {
    let database = setup_test_db().await;
    let state = app_state(&database, ScriptedGenerator::answering(&["ok"]));
    let user = state.auth.register("alice", "pw123").await.unwrap();
    let session = state.auth.login("alice", "pw123").await.unwrap();

    let req = Request::builder()
        .header(header::AUTHORIZATION, format!("Bearer {}", session.token))
        .body(())
        .unwrap();

    let (mut parts, _) = req.into_parts();
    let result = ExtractUser::from_request_parts(&mut parts, &state).await;

    assert_eq!(assert_ok!(result).0, user.id);
}

#[tokio::test]
async fn test_extract_user_session_cookie() {
    let database = setup_test_db().await;
    let state = app_state(&database, ScriptedGenerator::answering(&["ok"]));
    let user = state.auth.register("alice", "pw123").await.unwrap();
    let session = state.auth.login("alice", "pw123").await.unwrap();

    let req = Request::builder()
        .header(header::COOKIE, format!("session={}", session.token))
        .body(())
        .unwrap();

    let (mut parts, _) = req.into_parts();
    let result = ExtractUser::from_request_parts(&mut parts, &state).await;

    assert_eq!(result.unwrap().0, user.id);
}

#[tokio::test]
async fn test_extract_user_missing_token() {
    let database = setup_test_db().await;
    let state = app_state(&database, ScriptedGenerator::answering(&["ok"]));

    let req = Request::builder().body(()).unwrap();
    let (mut parts, _) = req.into_parts();
    let result = ExtractUser::from_request_parts(&mut parts, &state).await;

    let response = result.unwrap_err().into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_extract_user_unknown_token() {
    let database = setup_test_db().await;
    let state = app_state(&database, ScriptedGenerator::answering(&["ok"]));

    let req = Request::builder()
        .header(header::AUTHORIZATION, "Bearer not-a-real-token")
        .body(())
        .unwrap();
    let (mut parts, _) = req.into_parts();
    let result = ExtractUser::from_request_parts(&mut parts, &state).await;

    let response = result.unwrap_err().into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_extract_user_invalid_utf8() {
    let database = setup_test_db().await;
    let state = app_state(&database, ScriptedGenerator::answering(&["ok"]));

    let mut req = Request::builder().body(()).unwrap();
    req.headers_mut().insert(
        header::AUTHORIZATION,
        HeaderValue::from_bytes(&[0xFF, 0xFE]).unwrap(),
    );
    let (mut parts, _) = req.into_parts();
    let result = ExtractUser::from_request_parts(&mut parts, &state).await;

    assert_eq!(
        result.unwrap_err().into_response().status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_register_then_login() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));

    let user = auth.register("  alice ", "pw123").await.unwrap();
    assert_eq!(user.username, "alice");
    assert_ne!(user.password_hash, "pw123");

    let session = auth.login("alice", "pw123").await.unwrap();
    assert_eq!(session.user_id, user.id);
    assert!(session.expires_at > chrono::Utc::now());
    assert_eq!(auth.authenticate(&session.token).await.unwrap(), user.id);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));

    auth.register("alice", "pw123").await.unwrap();
    let result = auth.register("alice", "other").await;

    assert!(matches!(result, Err(AuthError::DuplicateUser)));
}

#[tokio::test]
async fn test_register_requires_username_and_password() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));

    assert!(matches!(
        auth.register("", "pw123").await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        auth.register("alice", "").await,
        Err(AuthError::Validation(_))
    ));
}

#[tokio::test]
async fn test_login_wrong_password_and_unknown_user() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));
    auth.register("alice", "pw123").await.unwrap();

    assert!(matches!(
        auth.login("alice", "wrong").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        auth.login("bob", "pw123").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));
    auth.register("alice", "pw123").await.unwrap();
    let first = auth.login("alice", "pw123").await.unwrap();
    let second = auth.login("alice", "pw123").await.unwrap();

    assert_ok!(auth.logout(&first.token).await);

    assert!(matches!(
        auth.authenticate(&first.token).await,
        Err(AuthError::Unauthenticated)
    ));
    // Other sessions of the same user stay valid.
    assert!(auth.authenticate(&second.token).await.is_ok());
    // Logging out twice is harmless.
    assert_ok!(auth.logout(&first.token).await);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::seconds(-1));
    auth.register("alice", "pw123").await.unwrap();
    let session = auth.login("alice", "pw123").await.unwrap();

    assert!(matches!(
        auth.authenticate(&session.token).await,
        Err(AuthError::Unauthenticated)
    ));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_sessions")
        .fetch_one(&*database)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_token_is_not_stored_in_plain_text() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));
    auth.register("alice", "pw123").await.unwrap();
    let session = auth.login("alice", "pw123").await.unwrap();

    let stored: String = sqlx::query_scalar("SELECT token_hash FROM auth_sessions")
        .fetch_one(&*database)
        .await
        .unwrap();
    assert_ne!(stored, session.token);
    assert_eq!(stored.len(), 64);
}

#[tokio::test]
async fn test_login_purges_expired_sessions() {
    let database = setup_test_db().await;
    let short_lived = auth_gateway(&database, chrono::Duration::seconds(-1));
    let auth = auth_gateway(&database, chrono::Duration::hours(1));
    auth.register("alice", "pw123").await.unwrap();
    auth.register("bob", "hunter2").await.unwrap();

    // Abandoned, already expired tokens of two users.
    short_lived.login("alice", "pw123").await.unwrap();
    short_lived.login("bob", "hunter2").await.unwrap();

    let session = auth.login("alice", "pw123").await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_sessions")
        .fetch_one(&*database)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    assert_ok!(auth.authenticate(&session.token).await);
}

#[tokio::test]
async fn test_tokens_are_long_random_hex() {
    let database = setup_test_db().await;
    let auth = auth_gateway(&database, chrono::Duration::hours(1));
    auth.register("alice", "pw123").await.unwrap();

    let first = auth.login("alice", "pw123").await.unwrap().token;
    let second = auth.login("alice", "pw123").await.unwrap().token;

    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(first, second);
}
