//! Registration and login endpoints

use crate::api::error::ApiError;
use crate::api::{AppState, SESSION_COOKIE, session_token};
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<schemas::Credentials>,
) -> Result<Json<schemas::User>, ApiError> {
    let user = state
        .auth
        .register(&credentials.username, &credentials.password)
        .await?;

    Ok(Json(schemas::User::from(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<schemas::Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .auth
        .login(&credentials.username, &credentials.password)
        .await?;

    let cookie = format!(
        "{SESSION_COOKIE}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        session.token,
        state.session_ttl.num_seconds()
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(schemas::LoginResponse {
            message: "Login successful.",
            user_id: session.user_id,
            username: session.username,
            token: session.token,
            expires_at: session.expires_at,
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_token(&headers) {
        state.auth.logout(&token).await?;
    }

    let expired = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    Ok((
        [(header::SET_COOKIE, expired)],
        Json(schemas::Info {
            message: "Logged out.",
        }),
    ))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize)]
    pub struct Credentials {
        #[serde(default)]
        pub username: String,
        #[serde(default)]
        pub password: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct User {
        pub id: Uuid,
        pub username: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::User> for User {
        fn from(user: entities::User) -> Self {
            User {
                id: user.id,
                username: user.username,
                created_at: user.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct LoginResponse {
        pub message: &'static str,
        pub user_id: Uuid,
        pub username: String,
        pub token: String,
        pub expires_at: DateTime<Utc>,
    }

    #[derive(Serialize, Debug)]
    pub struct Info {
        pub message: &'static str,
    }
}
