//! Shared fixtures: in-memory database, substitute extractor and generator,
//! HTTP helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, header};
use pdf_tutor_api::api::{self, AppState};
use pdf_tutor_api::core::assistant::{AnswerRequest, Prompts};
use pdf_tutor_api::core::auth::AuthGateway;
use pdf_tutor_api::core::services::ChatManager;
use pdf_tutor_api::core::traits::{
    AnswerGenerator, AnswerStream, DocumentExtractor, ExtractionError, GeneratorError,
};
use pdf_tutor_api::infrastructure::database::DatabaseConnection;
use pdf_tutor_api::infrastructure::entities::User;
use pdf_tutor_api::infrastructure::pdf::looks_like_pdf;
use pdf_tutor_api::infrastructure::repositories::{DbCredentialRepository, DbSessionRepository};
use pdf_tutor_api::infrastructure::traits::CredentialStore;
use futures_util::StreamExt;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const SAMPLE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF";
pub const SAMPLE_TEXT: &str = "Photosynthesis converts light energy into chemical energy.";

/// Single-connection in-memory database with migrations applied.
pub async fn setup_test_db() -> DatabaseConnection {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let database = DatabaseConnection::from_pool(pool);
    database.migrate().await.unwrap();
    database
}

/// Inserts a user directly, skipping password hashing.
pub async fn create_user(database: &DatabaseConnection, username: &str) -> uuid::Uuid {
    DbCredentialRepository::new(database.clone())
        .create_user(User {
            id: uuid::Uuid::new_v4(),
            username: username.to_string(),
            password_hash: "unused".to_string(),
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap()
        .id
}

/// Accepts anything with a PDF header and returns [`SAMPLE_TEXT`]. Bytes
/// containing `corrupt` fail extraction.
pub struct FakeExtractor;

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, ExtractionError> {
        if !looks_like_pdf(&bytes) {
            return Err(ExtractionError::UnsupportedFormat);
        }
        if bytes.windows(7).any(|w| w == b"corrupt") {
            return Err(ExtractionError::Failed("broken xref table".to_string()));
        }
        Ok(SAMPLE_TEXT.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Part(&'static str),
    Fail(&'static str),
    /// Never yields again, like an upstream that stopped responding.
    Stall,
}

/// Replays the same script for every request and records what it was asked.
pub struct ScriptedGenerator {
    script: Vec<Step>,
    refuse: bool,
    requests: Mutex<Vec<AnswerRequest>>,
}

impl ScriptedGenerator {
    pub fn answering(parts: &[&'static str]) -> Arc<Self> {
        Self::scripted(parts.iter().map(|p| Step::Part(*p)).collect())
    }

    pub fn scripted(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            refuse: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Fails before producing any output.
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            script: Vec::new(),
            refuse: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<AnswerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn generate(&self, request: AnswerRequest) -> Result<AnswerStream, GeneratorError> {
        self.requests.lock().unwrap().push(request);
        if self.refuse {
            return Err(GeneratorError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        }

        let items: Vec<Result<String, GeneratorError>> = self
            .script
            .iter()
            .take_while(|step| !matches!(step, Step::Stall))
            .map(|step| match step {
                Step::Part(text) => Ok(text.to_string()),
                Step::Fail(reason) => Err(GeneratorError::Stream(reason.to_string())),
                Step::Stall => unreachable!("the script ends at the first stall"),
            })
            .collect();
        let parts = futures_util::stream::iter(items);

        if self.script.iter().any(|step| matches!(step, Step::Stall)) {
            Ok(Box::pin(parts.chain(futures_util::stream::pending())))
        } else {
            Ok(Box::pin(parts))
        }
    }
}

pub fn chat_manager(database: &DatabaseConnection, generator: Arc<ScriptedGenerator>) -> ChatManager {
    ChatManager::new(
        Arc::new(DbSessionRepository::new(database.clone())),
        Arc::new(FakeExtractor),
        generator,
        Arc::new(Prompts::new("You are a tutor.").unwrap()),
        4,
    )
}

pub fn auth_gateway(database: &DatabaseConnection, ttl: chrono::Duration) -> AuthGateway {
    AuthGateway::new(Arc::new(DbCredentialRepository::new(database.clone())), ttl)
}

pub fn app_state(database: &DatabaseConnection, generator: Arc<ScriptedGenerator>) -> AppState {
    let session_ttl = chrono::Duration::hours(1);
    AppState {
        auth: auth_gateway(database, session_ttl),
        chats: chat_manager(database, generator),
        session_ttl,
        max_upload_bytes: 1024 * 1024,
    }
}

pub fn create_test_app(state: AppState) -> axum::Router {
    api::router(state)
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn upload_request(uri: &str, token: &str, field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "TEST-BOUNDARY-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Splits an SSE body into `(event name, JSON data)` pairs, skipping
/// keep-alive comments.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            let name = name?;
            let data = serde_json::from_str(&data).unwrap_or(Value::Null);
            Some((name, data))
        })
        .collect()
}

/// Registers `username` and returns a bearer token for it.
pub async fn register_and_login(app: &axum::Router, username: &str, password: &str) -> String {
    let credentials = serde_json::json!({ "username": username, "password": password });
    let response = send(app, json_request("POST", "/register", None, credentials.clone())).await;
    assert_eq!(response.status(), 200);

    let response = send(app, json_request("POST", "/login", None, credentials)).await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    json["token"].as_str().unwrap().to_string()
}
