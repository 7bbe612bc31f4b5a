use thiserror::Error;

/// Longest slice of an upstream error body kept inside [`GitLabError::Api`].
const MAX_ERROR_BODY: usize = 500;

#[derive(Error, Debug)]
pub enum GitLabError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitLab API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl GitLabError {
    /// Classify a non-success HTTP response into a typed error.
    pub fn from_status(status: reqwest::StatusCode, endpoint: &str, body: &str) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Self::Authentication(format!(
                "{endpoint}: {}",
                truncate_body(body)
            )),
            reqwest::StatusCode::NOT_FOUND => Self::NotFound(endpoint.to_string()),
            _ => Self::Api {
                status: status.as_u16(),
                body: truncate_body(body),
            },
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.is_empty() {
        return "No error details".to_string();
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

pub type Result<T> = std::result::Result<T, GitLabError>;
