use serde::{Deserialize, Serialize};

/// Structured error body returned by the backend on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Parses a response body, returning `None` when it carries no `message`.
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body).ok()
    }
}

/// Per-field validation failure for one wizard page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{} field(s) failed validation", .fields.len())]
pub struct PageErrors {
    pub fields: Vec<FieldError>,
}

impl PageErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), PageErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
