use serde::Deserialize;
use thiserror::Error;

/// Failure taxonomy shared by list fetches and mutations.
///
/// `Clone` so that one fetch error can be attached to a cache entry and seen
/// by every observer of that entry; transport errors are captured as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired - please sign in again")]
    AuthExpired,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{}", validation_display(.field.as_deref(), .message))]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Already removed: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

fn validation_display(field: Option<&str>, message: &str) -> String {
    match field {
        Some(field) => format!("Invalid {}: {}", field, message),
        None => format!("Invalid request: {}", message),
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shapes the API uses for rejected writes.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 409 | 422 => Self::validation_from_body(body),
            401 => ApiError::AuthExpired,
            403 => ApiError::AccessDenied(truncated),
            404 | 410 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Pull a field-level message out of `{ message, field }` or
    /// `{ errors: { field: [msg, ..] } }`; fall back to the raw body.
    fn validation_from_body(body: &str) -> Self {
        let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
            return ApiError::Validation {
                field: None,
                message: Self::truncate_body(body.trim()),
            };
        };

        if let Some((field, detail)) = parsed.errors.as_ref().and_then(|m| m.iter().next()) {
            let message = match detail {
                serde_json::Value::Array(msgs) => msgs
                    .iter()
                    .filter_map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return ApiError::Validation {
                field: Some(field.clone()),
                message,
            };
        }

        ApiError::Validation {
            field: parsed.field,
            message: parsed.message.unwrap_or_else(|| "rejected by server".to_string()),
        }
    }

    /// Transport failures, 5xx and rate limiting may succeed on a second try.
    /// Auth, validation and not-found never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Server(_) | ApiError::RateLimited
        )
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}
