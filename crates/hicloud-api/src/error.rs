use serde::Deserialize;

/// Failure of a remote call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API error {status} ({code}): {message}")]
    Http {
        status: u16,
        code: String,
        message: String,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("action {id} failed: {message}")]
    ActionFailed { id: u64, message: String },
    #[error("timed out waiting for action {0}")]
    Timeout(u64),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a non-2xx response body to an [`ApiError`].
///
/// The API wraps failures as `{"error": {"code": ..., "message": ...}}`; anything
/// else is reported verbatim.
pub fn error_from_response(status: u16, body: &str, path: &str) -> ApiError {
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => (env.error.code, env.error.message),
        Err(_) => (String::new(), body.trim().to_string()),
    };

    if status == 404 {
        let what = if message.is_empty() {
            path.to_string()
        } else {
            message
        };
        return ApiError::NotFound(what);
    }

    ApiError::Http {
        status,
        code: if code.is_empty() {
            "unknown".to_string()
        } else {
            code
        },
        message: if message.is_empty() {
            format!("request to {path} failed")
        } else {
            message
        },
    }
}
