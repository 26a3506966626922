use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    /// Device command failed, device went away, or an external tool misbehaved.
    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEPENDENCY", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    /// A check that runs before any device mutation did not hold.
    pub fn precondition(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_PRECONDITION", message, trace_id)
    }

    pub fn busy(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_BUSY", message, trace_id)
    }

    pub fn already_streaming(trace_id: impl Into<String>) -> Self {
        Self::new("ERR_ALREADY_STREAMING", "Log streaming is already running", trace_id)
    }

    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.error = format!("{context}: {}", self.error);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
