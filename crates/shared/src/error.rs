use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 409 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds an error from a failed response body, preferring the backend's
    /// `detail` field, then `message`, then the raw text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = ErrorBody::parse(body)
            .and_then(ErrorBody::into_text)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("request failed with status {status}")
                } else {
                    trimmed.to_string()
                }
            });
        Self::new(ErrorCode::from_status(status), message)
    }
}

/// JSON error body returned by the backend. FastAPI uses `detail`, some
/// handlers use `message`; `detail` may also be a list of validation entries.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub fn into_text(self) -> Option<String> {
        match self.detail {
            Some(serde_json::Value::String(text)) => return Some(text),
            Some(serde_json::Value::Null) | None => {}
            Some(other) => return Some(other.to_string()),
        }
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_string_is_used_verbatim() {
        let error = ApiError::from_response(400, r#"{"detail":"Persona name taken"}"#);
        assert_eq!(error.code, ErrorCode::Validation);
        assert_eq!(error.message, "Persona name taken");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let error = ApiError::from_response(422, r#"{"detail":[{"loc":["body","name"]}]}"#);
        assert_eq!(error.message, r#"[{"loc":["body","name"]}]"#);
    }

    #[test]
    fn falls_back_to_message_then_raw_text() {
        assert_eq!(
            ApiError::from_response(500, r#"{"message":"db down"}"#).message,
            "db down"
        );
        assert_eq!(
            ApiError::from_response(502, "Bad Gateway\n").message,
            "Bad Gateway"
        );
        let empty = ApiError::from_response(429, "");
        assert_eq!(empty.code, ErrorCode::RateLimited);
        assert_eq!(empty.message, "request failed with status 429");
    }
}
