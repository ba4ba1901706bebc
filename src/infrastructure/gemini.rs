//! Answer generation through the Gemini `streamGenerateContent` API.

use crate::config::GeminiSettings;
use crate::core::assistant::{AnswerRequest, Role};
use crate::core::traits::{AnswerGenerator, AnswerStream, GeneratorError};
use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures_util::{Stream, StreamExt};
use log::debug;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize, Deserialize, Debug)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl Content {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_owned()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

impl GeminiGenerator {
    /// Builds a client whose requests, including the streamed body, give up
    /// after `settings.request_timeout`.
    pub fn new(settings: &GeminiSettings) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GeneratorError::Request(e.to_string()))?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: &GeminiSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    fn build_request(&self, request: AnswerRequest) -> GenerateContentRequest {
        let contents = request
            .messages
            .into_iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Content::text(role, message.content)
            })
            .collect();

        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(request.system_prompt),
                }],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

/// Decodes one SSE `data:` payload into the text it carries.
fn parse_chunk(data: &str) -> Result<Option<String>, GeneratorError> {
    let chunk: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| GeneratorError::Stream(format!("malformed chunk: {e}")))?;

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GeneratorError::Blocked(reason));
    }

    let mut text = String::new();
    for candidate in chunk.candidates {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
                return Err(GeneratorError::Blocked(reason.to_owned()));
            }
        }
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        for part in parts {
            if let Some(part_text) = part.text {
                text.push_str(&part_text);
            }
        }
    }

    Ok((!text.is_empty()).then_some(text))
}

/// Turns the SSE events of a streaming response into answer text.
fn answer_parts<S, E>(events: S) -> impl Stream<Item = Result<String, GeneratorError>> + Send
where
    S: Stream<Item = Result<Event, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::try_stream! {
        futures_util::pin_mut!(events);
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| GeneratorError::Stream(e.to_string()))?;
            if event.data.trim().is_empty() {
                continue;
            }
            if let Some(text) = parse_chunk(&event.data)? {
                yield text;
            }
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, request: AnswerRequest) -> Result<AnswerStream, GeneratorError> {
        let body = self.build_request(request);
        debug!(
            "requesting answer from {} with {} context messages",
            self.model,
            body.contents.len()
        );

        let response = self
            .client
            .post(self.stream_url())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status { status, body });
        }

        let stream = answer_parts(response.bytes_stream().eventsource());
        Ok(Box::pin(stream))
    }
}
