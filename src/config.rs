//! Process configuration, read from the environment.

use crate::core::assistant::DEFAULT_SYSTEM_PROMPT;
use anyhow::{Context, anyhow};
use log::info;
use secrecy::SecretString;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Upper bound for one generation, from request to the last streamed part.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub gemini: GeminiSettings,
    pub system_prompt: String,
    pub session_ttl: chrono::Duration,
    pub max_upload_bytes: usize,
    pub stream_buffer: usize,
    pub static_dir: PathBuf,
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        load_env_file(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("GEMINI_API_KEY (or GOOGLE_API_KEY) must be set"))?;

        let session_ttl_hours: i64 = parse_or(&lookup, "SESSION_TTL_HOURS", 168)?;
        if session_ttl_hours <= 0 {
            return Err(anyhow!("SESSION_TTL_HOURS must be positive"));
        }
        let timeout_secs: u64 = parse_or(&lookup, "GEMINI_TIMEOUT_SECS", 300)?;
        if timeout_secs == 0 {
            return Err(anyhow!("GEMINI_TIMEOUT_SECS must be positive"));
        }

        Ok(Settings {
            bind_address: parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://pdf_tutor.db".to_owned()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            gemini: GeminiSettings {
                api_key: SecretString::from(api_key),
                model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash-latest".to_owned()),
                base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| {
                    "https://generativelanguage.googleapis.com/v1beta".to_owned()
                }),
                temperature: parse_or(&lookup, "GEMINI_TEMPERATURE", 0.3)?,
                max_output_tokens: parse_or(&lookup, "GEMINI_MAX_OUTPUT_TOKENS", 2048)?,
                request_timeout: Duration::from_secs(timeout_secs),
            },
            system_prompt: lookup("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
            session_ttl: chrono::Duration::hours(session_ttl_hours),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            stream_buffer: parse_or(&lookup, "STREAM_BUFFER", 32)?,
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "static".to_owned()).into(),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_owned())
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect(),
        })
    }
}

/// A missing `.env` is fine; an unreadable or malformed one is not.
fn load_env_file(result: Result<PathBuf, dotenvy::Error>) -> anyhow::Result<()> {
    match result {
        Ok(path) => {
            info!("loaded environment from {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("failed to read .env file"),
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
    }
}
