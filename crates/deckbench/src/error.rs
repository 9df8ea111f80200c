//! Error types for deckbench.
//!
//! Every fallible operation in the library returns [`DeckbenchError`]. The
//! variants mirror the failure classes the extraction pipeline cares about:
//!
//! - `NotFound` - a source document, image or corpus folder does not exist
//! - `DependencyUnavailable` - a binary, worker or model cannot be loaded
//! - `Configuration` - missing credential, invalid method set, bad config file
//! - `MalformedResponse` - structured output that could not be parsed at all
//!
//! **System errors always bubble up unchanged:** `DeckbenchError::Io` is never
//! wrapped or downgraded. Nothing in the library retries automatically; callers
//! that want retries wrap the call themselves.
//!
//! # Example
//!
//! ```rust
//! use deckbench::{DeckbenchError, Result};
//! use std::path::Path;
//!
//! fn require(path: &Path) -> Result<()> {
//!     if !path.exists() {
//!         return Err(DeckbenchError::not_found("document", path));
//!     }
//!     Ok(())
//! }
//! ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using `DeckbenchError`.
pub type Result<T> = std::result::Result<T, DeckbenchError>;

/// Main error type for all deckbench operations.
#[derive(Debug, Error)]
pub enum DeckbenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} not found: {}", .path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    #[error("Dependency unavailable: {dependency}. {hint}")]
    DependencyUnavailable { dependency: String, hint: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Rendering failed: {message}")]
    Render {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Rendering produced no page images for {}", .path.display())]
    EmptyRender { path: PathBuf },

    #[error("Backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    #[error("Image processing error: {message}")]
    ImageProcessing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for DeckbenchError {
    fn from(err: serde_json::Error) -> Self {
        DeckbenchError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<image::ImageError> for DeckbenchError {
    fn from(err: image::ImageError) -> Self {
        DeckbenchError::ImageProcessing {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for DeckbenchError {
    fn from(err: reqwest::Error) -> Self {
        DeckbenchError::Backend {
            backend: "http".to_string(),
            message: err.to_string(),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl DeckbenchError {
    error_constructor!(malformed_response, MalformedResponse);
    error_constructor!(parsing, Parsing);
    error_constructor!(render, Render);
    error_constructor!(image_processing, ImageProcessing);
    error_constructor!(serialization, Serialization);

    pub fn not_found(kind: &'static str, path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            kind,
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn dependency_unavailable(dependency: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency: dependency.into(),
            hint: hint.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DeckbenchError = io_err.into();
        assert!(matches!(err, DeckbenchError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_not_found_message_names_kind_and_path() {
        let err = DeckbenchError::not_found("image", "/tmp/missing.png");
        assert_eq!(err.to_string(), "image not found: /tmp/missing.png");
    }

    #[test]
    fn test_dependency_unavailable_carries_hint() {
        let err = DeckbenchError::dependency_unavailable("pdftoppm", "Install poppler-utils.");
        assert_eq!(err.to_string(), "Dependency unavailable: pdftoppm. Install poppler-utils.");
    }

    #[test]
    fn test_configuration_error() {
        let err = DeckbenchError::configuration("ANTHROPIC_API_KEY is not set");
        assert_eq!(err.to_string(), "Configuration error: ANTHROPIC_API_KEY is not set");
    }

    #[test]
    fn test_malformed_response_with_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DeckbenchError::malformed_response_with_source("not JSON", source);
        assert_eq!(err.to_string(), "Malformed response: not JSON");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_empty_render() {
        let err = DeckbenchError::EmptyRender {
            path: PathBuf::from("deck.pptx"),
        };
        assert_eq!(err.to_string(), "Rendering produced no page images for deck.pptx");
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DeckbenchError = json_err.into();
        assert!(matches!(err, DeckbenchError::Serialization { .. }));
    }

    #[test]
    fn test_backend_error() {
        let err = DeckbenchError::backend("glm-ocr", "status 500");
        assert_eq!(err.to_string(), "Backend 'glm-ocr' failed: status 500");
    }
}
