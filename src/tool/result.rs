//! Tool invocation results

use serde::{Deserialize, Serialize};

use crate::Error;

/// Content block returned by a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Text content
    Text {
        /// Text value
        text: String,
    },
}

impl Content {
    /// Text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text payload of the block
    #[must_use]
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Failure category reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Arguments rejected before any upstream call
    Validation,
    /// Tool hidden by the filter policy
    FilterDenied,
    /// No tool with that name
    ToolNotFound,
    /// Manager or credential exchange failed
    Upstream,
}

/// Structured failure attached to a [`ToolResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Category
    pub kind: ToolErrorKind,
    /// Human-readable message
    pub message: String,
    /// Upstream HTTP status, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ToolError {
    /// Error of the given kind without a status
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    /// Validation failure with a rendered message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, message)
    }

    /// Map a taxonomy error into its reported form.
    ///
    /// Returns `None` for errors outside the invocation taxonomy.
    #[must_use]
    pub fn from_error(err: &Error) -> Option<Self> {
        let (kind, status_code) = match err {
            Error::Validation(_) | Error::ClusterNotFound(_) => (ToolErrorKind::Validation, None),
            Error::FilterDenied { .. } => (ToolErrorKind::FilterDenied, None),
            Error::ToolNotFound(_) => (ToolErrorKind::ToolNotFound, None),
            Error::Upstream { status, .. } | Error::Auth { status, .. } => {
                (ToolErrorKind::Upstream, *status)
            }
            _ => return None,
        };

        Some(Self {
            kind,
            message: err.to_string(),
            status_code,
        })
    }
}

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool ran to completion
    pub success: bool,
    /// Content blocks
    pub content: Vec<Content>,
    /// Failure details when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    /// Successful result
    #[must_use]
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            success: true,
            content,
            error: None,
        }
    }

    /// Failed result; the message is mirrored into a text block for the model
    #[must_use]
    pub fn failure(error: ToolError) -> Self {
        Self {
            success: false,
            content: vec![Content::text(error.message.clone())],
            error: Some(error),
        }
    }

    /// Failed result from a taxonomy error, `None` for anything else
    #[must_use]
    pub fn from_error(err: &Error) -> Option<Self> {
        ToolError::from_error(err).map(Self::failure)
    }

    /// Kind of failure, if any
    #[must_use]
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// All text blocks joined with newlines
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
