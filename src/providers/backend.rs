//! Remote backend descriptors.
//!
//! A [`BackendDescriptor`] says everything the dispatcher needs to call one
//! remote text-generation endpoint: where it lives, how to shape the request
//! body, where the generated text sits in the response, and how long to wait.
//! Descriptors are configuration data and are never mutated at run time.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::types::PreparedRequest;
use crate::{Result, SwitchyardError};

/// Default Ollama generate endpoint.
pub const OLLAMA_ENDPOINT: &str = "http://localhost:11434/api/generate";

/// Model requested from Ollama by the default chain.
pub const OLLAMA_DEFAULT_MODEL: &str = "mistral";

/// Default HuggingFace Inference API endpoint.
pub const HF_INFERENCE_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.1";

/// Environment variable holding the HuggingFace API key.
pub const HF_API_KEY_ENV: &str = "HF_API_KEY";

/// How the request body is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestTemplate {
    /// Ollama `/api/generate`: `{model, prompt, system, stream: false, options}`.
    Ollama {
        #[serde(default = "default_ollama_model")]
        model: String,
    },
    /// HuggingFace text-generation: `{inputs, parameters}` with an
    /// instruction-formatted prompt.
    HfInference,
    /// Arbitrary JSON body with placeholders.
    ///
    /// A string that is exactly `{temperature}`, `{top_p}` or `{max_length}`
    /// becomes a JSON number. `{prompt}` and `{system_prompt}` are substituted
    /// inside any string.
    Custom { body: Value },
}

fn default_ollama_model() -> String {
    OLLAMA_DEFAULT_MODEL.to_string()
}

impl RequestTemplate {
    /// Build the request body for `request`.
    pub fn render(&self, request: &PreparedRequest) -> Value {
        match self {
            Self::Ollama { model } => json!({
                "model": model,
                "prompt": request.prompt,
                "system": request.system_prompt,
                "stream": false,
                "options": {
                    "temperature": request.temperature,
                    "top_p": request.top_p,
                    "num_predict": request.max_length,
                },
            }),
            Self::HfInference => json!({
                "inputs": request.instruct_prompt(),
                "parameters": {
                    "max_length": request.max_length,
                    "temperature": request.temperature,
                    "top_p": request.top_p,
                },
            }),
            Self::Custom { body } => substitute(body, request),
        }
    }
}

fn substitute(value: &Value, request: &PreparedRequest) -> Value {
    match value {
        Value::String(s) => match s.as_str() {
            "{temperature}" => json!(request.temperature),
            "{top_p}" => json!(request.top_p),
            "{max_length}" => json!(request.max_length),
            _ => Value::String(
                s.replace("{prompt}", &request.prompt)
                    .replace("{system_prompt}", &request.system_prompt),
            ),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, request)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, request)))
                .collect::<Map<_, _>>(),
        ),
        other => other.clone(),
    }
}

/// Top-level shape of a backend response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// The result path is resolved against the response object.
    #[default]
    Object,
    /// The response is an array; the path is resolved against its first element.
    FirstOfArray,
}

/// One remote backend in the fallback chain.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub name: String,
    pub endpoint: String,
    pub template: RequestTemplate,
    /// Dotted path to the generated text; numeric segments index arrays.
    pub result_field: String,
    pub shape: ResponseShape,
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("template", &self.template)
            .field("result_field", &self.result_field)
            .field("shape", &self.shape)
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BackendDescriptor {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        template: RequestTemplate,
        result_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            template,
            result_field: result_field.into(),
            shape: ResponseShape::Object,
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }

    /// Local Ollama server, 30 s timeout.
    pub fn ollama(endpoint: impl Into<String>) -> Self {
        Self::new(
            "ollama",
            endpoint,
            RequestTemplate::Ollama {
                model: default_ollama_model(),
            },
            "response",
        )
    }

    /// HuggingFace Inference API, 45 s timeout.
    pub fn huggingface(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            shape: ResponseShape::FirstOfArray,
            timeout: Duration::from_secs(45),
            api_key,
            ..Self::new(
                "huggingface",
                endpoint,
                RequestTemplate::HfInference,
                "generated_text",
            )
        }
    }

    /// The chain used when none is configured: Ollama, then HuggingFace
    /// (key from `HF_API_KEY`).
    pub fn default_chain() -> Vec<Self> {
        vec![
            Self::ollama(OLLAMA_ENDPOINT),
            Self::huggingface(HF_INFERENCE_ENDPOINT, std::env::var(HF_API_KEY_ENV).ok()),
        ]
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Pull the generated text out of a parsed response body.
    pub fn extract(&self, body: &Value) -> Result<String> {
        let root = match self.shape {
            ResponseShape::Object => body,
            ResponseShape::FirstOfArray => body
                .as_array()
                .and_then(|items| items.first())
                .ok_or_else(|| {
                    SwitchyardError::UnexpectedShape(format!(
                        "{}: expected a non-empty array",
                        self.name
                    ))
                })?,
        };

        let mut current = root;
        for segment in self.result_field.split('.').filter(|s| !s.is_empty()) {
            let next = match segment.parse::<usize>() {
                Ok(index) => current.get(index),
                Err(_) => current.get(segment),
            };
            current = next.ok_or_else(|| {
                SwitchyardError::UnexpectedShape(format!(
                    "{}: missing field '{}'",
                    self.name, self.result_field
                ))
            })?;
        }

        match current.as_str() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            Some(_) => Err(SwitchyardError::UnexpectedShape(format!(
                "{}: '{}' is empty",
                self.name, self.result_field
            ))),
            None => Err(SwitchyardError::UnexpectedShape(format!(
                "{}: '{}' is not a string",
                self.name, self.result_field
            ))),
        }
    }
}
