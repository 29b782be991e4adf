//! Generation request types.

use serde::{Deserialize, Serialize};

/// System prompt applied when the caller does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps the user accurately and kindly.";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default nucleus sampling threshold.
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Default generation length.
pub const DEFAULT_MAX_LENGTH: u32 = 800;

/// A text generation request as received from a caller.
///
/// Optional fields fall back to the defaults above when the request is
/// prepared by [`RequestLimits::prepare`](crate::types::RequestLimits::prepare).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// User prompt. Must be non-empty.
    pub prompt: String,

    /// System prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature (0.0 to 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Nucleus sampling threshold (0.0 exclusive to 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Maximum generation length. Any integer is accepted and clamped
    /// into the configured bounds when the request is prepared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,

    /// Owner scope for cache isolation. Entries stored without a scope are
    /// shared by everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Accepted for compatibility; responses are never streamed.
    #[serde(default, skip_serializing)]
    pub stream: bool,
}

impl GenerateRequest {
    /// Create a request with the given prompt and default parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            top_p: None,
            max_length: None,
            scope: None,
            stream: false,
        }
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set temperature.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set top_p.
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set max length.
    pub fn max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Restrict cache sharing to the given owner scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// A validated request with every parameter resolved.
///
/// This is what the cache key, the local generator, and the backend
/// templates see. Produced only by [`RequestLimits::prepare`](crate::types::RequestLimits::prepare).
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_length: u32,
    pub scope: Option<String>,
}

impl PreparedRequest {
    /// Instruction-formatted prompt used by raw text-completion backends.
    pub fn instruct_prompt(&self) -> String {
        format!(
            "<s>[INST] {}\n\n{} [/INST]",
            self.system_prompt, self.prompt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = GenerateRequest::new("hello")
            .system_prompt("be brief")
            .temperature(0.2)
            .top_p(0.5)
            .max_length(64)
            .scope("alice");
        assert_eq!(req.prompt, "hello");
        assert_eq!(req.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.top_p, Some(0.5));
        assert_eq!(req.max_length, Some(64));
        assert_eq!(req.scope.as_deref(), Some("alice"));
    }

    #[test]
    fn deserialize_minimal_body() {
        let req: GenerateRequest = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert_eq!(req, GenerateRequest::new("hi"));
    }

    #[test]
    fn deserialize_accepts_null_and_stream() {
        let req: GenerateRequest = serde_json::from_str(
            r#"{"prompt":"hi","system_prompt":null,"stream":true,"max_length":10}"#,
        )
        .unwrap();
        assert!(req.system_prompt.is_none());
        assert!(req.stream);
        assert_eq!(req.max_length, Some(10));
    }

    #[test]
    fn deserialize_accepts_out_of_range_max_length() {
        let negative: GenerateRequest =
            serde_json::from_str(r#"{"prompt":"x","max_length":-5}"#).unwrap();
        assert_eq!(negative.max_length, Some(-5));
        let huge: GenerateRequest =
            serde_json::from_str(r#"{"prompt":"x","max_length":5000000000}"#).unwrap();
        assert_eq!(huge.max_length, Some(5_000_000_000));
    }

    #[test]
    fn instruct_prompt_format() {
        let prepared = PreparedRequest {
            prompt: "What is Rust?".into(),
            system_prompt: "Be helpful.".into(),
            temperature: 0.7,
            top_p: 0.9,
            max_length: 100,
            scope: None,
        };
        assert_eq!(
            prepared.instruct_prompt(),
            "<s>[INST] Be helpful.\n\nWhat is Rust? [/INST]"
        );
    }
}
