//! Chat session endpoints

use crate::api::error::ApiError;
use crate::api::{AppState, ExtractUser};
use crate::core::services::{AnswerTurn, TurnEvent};
use async_stream::stream;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::Stream;
use log::error;
use serde::Serialize;
use std::convert::Infallible;
use uuid::Uuid;

const UPLOAD_FIELDS: [&str; 2] = ["file", "pdf_file"];

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_sessions)
                .post(create_session)
                .delete(delete_all_sessions),
        )
        .route("/:id", delete(delete_session))
        .route("/:id/messages", get(session_messages))
        .route(
            "/:id/document",
            post(upload_document).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/:id/ask", post(ask))
}

async fn list_sessions(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
) -> Result<Json<schemas::SessionList>, ApiError> {
    let sessions = state.chats.list_sessions(current_user).await?;

    Ok(Json(schemas::SessionList {
        sessions: sessions.into_iter().map(schemas::Session::from).collect(),
    }))
}

async fn create_session(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
) -> Result<(StatusCode, Json<schemas::Session>), ApiError> {
    let session = state.chats.create_session(current_user).await?;

    Ok((StatusCode::CREATED, Json(schemas::Session::from(session))))
}

async fn delete_session(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<schemas::Deleted>, ApiError> {
    state.chats.delete_session(current_user, session_id).await?;

    Ok(Json(schemas::Deleted { id: session_id }))
}

async fn delete_all_sessions(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
) -> Result<Json<schemas::Cleared>, ApiError> {
    let deleted = state.chats.delete_all_sessions(current_user).await?;

    Ok(Json(schemas::Cleared { deleted }))
}

async fn session_messages(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<schemas::MessagesList>, ApiError> {
    let messages = state.chats.list_messages(current_user, session_id).await?;

    Ok(Json(schemas::MessagesList {
        messages: messages.into_iter().map(schemas::Message::from).collect(),
    }))
}

async fn upload_document(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<schemas::Document>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name().is_some_and(|name| UPLOAD_FIELDS.contains(&name)) {
            let file_name = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await?;
            upload = Some((file_name, bytes.to_vec()));
            break;
        }
    }

    let (file_name, bytes) = upload.ok_or_else(|| {
        ApiError::BadRequest("a PDF file is required in the `file` field".to_owned())
    })?;

    let document = state
        .chats
        .upload_document(current_user, session_id, file_name, bytes)
        .await?;

    Ok(Json(schemas::Document {
        session_id: document.session_id,
        document_name: document.document_name,
        characters: document.characters,
    }))
}

async fn ask(
    State(state): State<AppState>,
    ExtractUser(current_user): ExtractUser,
    Path(session_id): Path<Uuid>,
    Json(request): Json<schemas::Ask>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let AnswerTurn {
        user_message,
        answer_message_id,
        mut events,
    } = state
        .chats
        .ask(current_user, session_id, &request.question)
        .await?;

    let stream = stream! {
        yield Ok::<_, Infallible>(sse_event("new_message", &schemas::Message::from(user_message)));

        let mut status = schemas::TurnStatus::Failed;
        while let Some(turn_event) = events.recv().await {
            match turn_event {
                TurnEvent::Part(text) => {
                    yield Ok(sse_event("message_part", &schemas::MessagePart {
                        session_id,
                        message_id: answer_message_id,
                        text,
                    }));
                }
                TurnEvent::Completed { .. } => {
                    status = schemas::TurnStatus::Completed;
                    break;
                }
                TurnEvent::Failed { message_id, error } => {
                    yield Ok(sse_event("error", &schemas::StreamError { message_id, error }));
                    break;
                }
            }
        }

        yield Ok(sse_event("end_of_stream", &schemas::EndOfStream {
            session_id,
            message_id: answer_message_id,
            status,
        }));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(name: &'static str, data: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| {
            error!("failed to encode `{name}` event: {e}");
            Event::default().event(name)
        })
}

pub mod schemas {
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    pub struct Ask {
        #[serde(default)]
        pub question: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Session {
        pub id: Uuid,
        pub title: Option<String>,
        pub document_name: Option<String>,
        pub created_at: DateTime<Utc>,
        pub last_active_at: DateTime<Utc>,
    }

    impl From<entities::SessionSummary> for Session {
        fn from(session: entities::SessionSummary) -> Self {
            Session {
                id: session.id,
                title: session.title,
                document_name: session.document_name,
                created_at: session.created_at,
                last_active_at: session.last_active_at,
            }
        }
    }

    impl From<entities::ChatSession> for Session {
        fn from(session: entities::ChatSession) -> Self {
            Session {
                id: session.id,
                title: session.title,
                document_name: session.document_name,
                created_at: session.created_at,
                last_active_at: session.last_active_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct SessionList {
        pub sessions: Vec<Session>,
    }

    #[derive(Serialize, Debug)]
    pub struct Deleted {
        pub id: Uuid,
    }

    #[derive(Serialize, Debug)]
    pub struct Cleared {
        pub deleted: u64,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Document {
        pub session_id: Uuid,
        pub document_name: Option<String>,
        pub characters: usize,
    }

    #[derive(Serialize, Debug, Default)]
    pub struct MessagesList {
        pub messages: Vec<Message>,
    }

    #[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
        Error,
    }

    impl From<entities::MessageKind> for Role {
        fn from(kind: entities::MessageKind) -> Self {
            match kind {
                entities::MessageKind::User => Role::User,
                entities::MessageKind::Assistant => Role::Assistant,
                entities::MessageKind::Error => Role::Error,
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Message {
        pub id: Uuid,
        pub session_id: Uuid,
        pub role: Role,
        pub text: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::Message> for Message {
        fn from(message: entities::Message) -> Self {
            Message {
                id: message.id,
                session_id: message.session_id,
                role: message.kind.into(),
                text: message.text,
                created_at: message.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub session_id: Uuid,
        pub message_id: Uuid,
        pub text: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct StreamError {
        pub message_id: Uuid,
        pub error: String,
    }

    #[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum TurnStatus {
        Completed,
        Failed,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct EndOfStream {
        pub session_id: Uuid,
        pub message_id: Uuid,
        pub status: TurnStatus,
    }
}
