//! Generation response types.

use serde::{Deserialize, Serialize};

/// Text returned when every backend in the fallback chain failed.
pub const NO_RESULT_TEXT: &str = "Sorry, I can't generate a response right now. \
     Please check your internet connection or try again later.";

/// How a response was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationSource {
    /// Served from the response cache.
    Cache,
    /// Produced by the local model.
    Local,
    /// Produced by the named remote backend.
    Remote { backend: String },
    /// No backend produced a result; the text is [`NO_RESULT_TEXT`].
    Unavailable,
}

impl GenerationSource {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &str {
        match self {
            Self::Cache => "cache",
            Self::Local => "local",
            Self::Remote { backend } => backend,
            Self::Unavailable => "none",
        }
    }
}

/// Response to a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text (or the no-result sentinel).
    pub generated_text: String,

    /// Whether the text came from the response cache.
    pub cached: bool,

    /// Set when local generation failed and the remote chain answered instead.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,

    /// Where the text came from.
    pub source: GenerationSource,
}

impl GenerateResponse {
    /// Response served from the cache.
    pub fn from_cache(text: String) -> Self {
        Self {
            generated_text: text,
            cached: true,
            fallback: false,
            source: GenerationSource::Cache,
        }
    }

    /// Whether this response carries the no-result sentinel.
    pub fn is_unavailable(&self) -> bool {
        self.source == GenerationSource::Unavailable
    }
}
