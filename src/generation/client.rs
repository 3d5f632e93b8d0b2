//! The question-generation seam consumed by the cache.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::item::{Item, ItemError, Key};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generated question failed validation: {0}")]
    Validation(String),

    #[error("Generated question is invalid: {0}")]
    InvalidItem(#[from] ItemError),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Whether a later attempt may succeed.
    ///
    /// Everything except a generator that was never configured is
    /// transient; the cache absorbs both kinds the same way.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GenerationError::Unavailable(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Http(_) => "http",
            GenerationError::Api { .. } => "api",
            GenerationError::MalformedResponse(_) | GenerationError::Json(_) => "malformed",
            GenerationError::Validation(_) | GenerationError::InvalidItem(_) => "validation",
            GenerationError::Unavailable(_) => "unavailable",
        }
    }
}

/// Produces one new question for a pool.
///
/// Implementations may be slow, rate limited and fail arbitrarily. They
/// must not retry internally; retry policy belongs to callers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, key: &Key) -> Result<Item, GenerationError>;
}

/// Run one generation call under a deadline.
///
/// Exceeding `deadline` yields [`GenerationError::Timeout`]; the in-flight
/// call is dropped.
pub async fn generate_within(
    client: &dyn GenerationClient,
    key: &Key,
    deadline: Duration,
) -> Result<Item, GenerationError> {
    match tokio::time::timeout(deadline, client.generate(key)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(deadline)),
    }
}
