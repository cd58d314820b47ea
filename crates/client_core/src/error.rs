use std::{collections::BTreeMap, fmt};

use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid api base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {}", .error.message)]
    Status {
        url: String,
        status: u16,
        error: ApiError,
    },
    #[error("invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl RequestError {
    /// Text suitable for showing to the user as-is.
    pub fn detail(&self) -> String {
        match self {
            Self::Status { error, .. } => error.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Status { error, .. } => error.code,
            Self::InvalidBaseUrl { .. } => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        }
    }
}

/// Field-keyed validation failures collected from a form before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    Prompt,
    Persona,
    ApiKey,
}

impl fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prompt => "prompt",
            Self::Persona => "assistant",
            Self::ApiKey => "api key",
        })
    }
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("failed to save {stage}: {detail}")]
    Backend {
        stage: SubmitStage,
        status: u16,
        detail: String,
    },
    #[error("failed to save {stage}: {source}")]
    Request {
        stage: SubmitStage,
        #[source]
        source: RequestError,
    },
}

impl EditorError {
    pub fn from_request(stage: SubmitStage, err: RequestError) -> Self {
        match err {
            RequestError::Status { status, error, .. } => Self::Backend {
                stage,
                status,
                detail: error.message,
            },
            source => Self::Request { stage, source },
        }
    }

    /// Message for the blocking error popup; backend details pass through verbatim.
    pub fn popup_message(&self) -> String {
        match self {
            Self::Backend { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}
