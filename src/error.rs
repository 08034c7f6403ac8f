//! Error types for the export pipeline.
//!
//! Configuration problems are detected before any network call. Formatting
//! problems abort assembly. Transport problems come from the remote API and
//! are never retried.

use thiserror::Error;

use crate::jsx::ParseError;

/// Fixed identifier of the host notification raised on failure.
pub const NOTIFICATION_ID: &str = "story-sandbox/export-failed";

/// Headline of the host notification raised on failure.
pub const NOTIFICATION_HEADLINE: &str = "Could not export story to CodeSandbox";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("an API token is required to create a sandbox through the API")]
    MissingApiToken,

    #[error("fallback import '{key}' must map to a list of names, found a {shape} import")]
    FallbackNotList { key: String, shape: &'static str },

    #[error("unsupported template: {0}")]
    UnsupportedTemplate(String),

    #[error("invalid import spec for '{key}': {reason}")]
    InvalidImportSpec { key: String, reason: String },

    #[error("invalid options: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("cannot format {path}: {source}")]
    Syntax {
        path: String,
        #[source]
        source: ParseError,
    },

    #[error("no formatter for {path}")]
    UnsupportedPath { path: String },
}

impl FormatError {
    /// The file that failed to format.
    pub fn path(&self) -> &str {
        match self {
            Self::Syntax { path, .. } | Self::UnsupportedPath { path } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("sandbox API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response from sandbox API: {message}")]
    InvalidResponse { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("parameters are not valid compressed data")]
    Decompress,

    #[error("decompressed parameters are not valid UTF-16")]
    Utf16,

    #[error("parameters are not a valid manifest: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("formatting error: {0}")]
    Formatting(#[from] FormatError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("story source cannot be parsed: {0}")]
    Scan(#[from] ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What the host shows the user when an export fails.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: &'static str,
    pub headline: String,
    pub sub_headline: String,
}

impl ExportError {
    pub fn notification(&self) -> Notification {
        Notification {
            id: NOTIFICATION_ID,
            headline: NOTIFICATION_HEADLINE.to_string(),
            sub_headline: self.to_string(),
        }
    }

    /// Exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 1,
            Self::Formatting(_) => 2,
            Self::Transport(_) => 3,
            Self::Codec(_) | Self::Scan(_) | Self::Serialization(_) => 4,
        }
    }
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_carries_fixed_id() {
        let err = ExportError::from(ConfigError::MissingApiToken);
        let note = err.notification();
        assert_eq!(note.id, NOTIFICATION_ID);
        assert_eq!(note.headline, NOTIFICATION_HEADLINE);
        assert!(note.sub_headline.contains("API token"));
    }

    #[test]
    fn test_format_error_names_path() {
        let err = FormatError::Syntax {
            path: "src/App.js".into(),
            source: ParseError::Missing {
                what: "}".into(),
                line: 4,
            },
        };
        assert_eq!(err.path(), "src/App.js");
        assert!(err.to_string().contains("line 4"));
        assert_eq!(ExportError::from(err).exit_code(), 2);
    }
}
