use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a backend for one physical statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCause {
    /// Vendor error code, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Five character SQLSTATE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    pub message: String,
}

impl DriverCause {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            sql_state: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: u16, sql_state: impl Into<String>) -> Self {
        self.code = Some(code);
        self.sql_state = Some(sql_state.into());
        self
    }
}

impl fmt::Display for DriverCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.sql_state) {
            (Some(code), Some(state)) => write!(f, "[{} ({})] {}", code, state, self.message),
            (Some(code), None) => write!(f, "[{}] {}", code, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Flat classification of [`ExecutionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Driver,
    Timeout,
    Resource,
    Unsupported,
    InvalidState,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Driver => "driver_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Resource => "resource_error",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Unknown => "unknown_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Driver error on data source '{data_source}': {cause}")]
    Driver {
        data_source: String,
        cause: DriverCause,
    },

    #[error("Timed out after {waited:?} waiting for backend replies (correlation id {correlation_id}, received {received}/{expected})")]
    Timeout {
        correlation_id: u64,
        waited: Duration,
        received: usize,
        expected: usize,
    },

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type ExecResult<T> = Result<T, ExecutionError>;

impl ExecutionError {
    pub fn driver(data_source: impl Into<String>, cause: DriverCause) -> Self {
        ExecutionError::Driver {
            data_source: data_source.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Driver { .. } => ErrorKind::Driver,
            ExecutionError::Timeout { .. } => ErrorKind::Timeout,
            ExecutionError::Resource(_) => ErrorKind::Resource,
            ExecutionError::Unsupported(_) => ErrorKind::Unsupported,
            ExecutionError::InvalidState(_) => ErrorKind::InvalidState,
            ExecutionError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// The backend cause, for driver errors
    pub fn driver_cause(&self) -> Option<&DriverCause> {
        match self {
            ExecutionError::Driver { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl serde::Serialize for ExecutionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl IntoResponse for ExecutionError {
    fn into_response(self) -> Response {
        let status = match &self {
            ExecutionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ExecutionError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            ExecutionError::Resource(_) => StatusCode::SERVICE_UNAVAILABLE,
            ExecutionError::InvalidState(_) => StatusCode::BAD_REQUEST,
            // Default to 500
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
            "kind": self.kind().as_str(),
        });
        if let Some(cause) = self.driver_cause() {
            body["cause"] = serde_json::to_value(cause).unwrap_or_default();
        }

        (status, Json(body)).into_response()
    }
}
