//! Request validation and parameter normalisation.

use serde::Deserialize;

use super::request::{
    DEFAULT_MAX_LENGTH, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
    GenerateRequest, PreparedRequest,
};
use crate::{Result, SwitchyardError};

/// Bounds applied to every incoming request.
///
/// Invalid prompts and out-of-range sampling parameters are rejected;
/// `max_length` is clamped into `[max_length_min, max_length_max]`.
///
/// ```toml
/// [limits]
/// max_prompt_chars = 10000
/// max_length_min = 1
/// max_length_max = 4096
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RequestLimits {
    /// Maximum prompt length in characters. Default: 10,000.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Lower clamp bound for `max_length`. Default: 1.
    #[serde(default = "default_max_length_min")]
    pub max_length_min: u32,
    /// Upper clamp bound for `max_length`. Default: 4,096.
    #[serde(default = "default_max_length_max")]
    pub max_length_max: u32,
}

fn default_max_prompt_chars() -> usize {
    10_000
}

fn default_max_length_min() -> u32 {
    1
}

fn default_max_length_max() -> u32 {
    4_096
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            max_length_min: default_max_length_min(),
            max_length_max: default_max_length_max(),
        }
    }
}

impl RequestLimits {
    /// Validate a request and resolve its defaults.
    ///
    /// Returns `InvalidInput` for an empty or oversized prompt, a
    /// temperature outside `[0, 2]`, or a `top_p` outside `(0, 1]`.
    pub fn prepare(&self, request: &GenerateRequest) -> Result<PreparedRequest> {
        if request.prompt.trim().is_empty() {
            return Err(SwitchyardError::InvalidInput(
                "prompt must not be empty".to_string(),
            ));
        }

        let chars = request.prompt.chars().count();
        if chars > self.max_prompt_chars {
            return Err(SwitchyardError::InvalidInput(format!(
                "prompt is too long ({chars} characters, max {})",
                self.max_prompt_chars
            )));
        }

        let temperature = request.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(SwitchyardError::InvalidInput(format!(
                "temperature must be between 0 and 2, got {temperature}"
            )));
        }

        let top_p = request.top_p.unwrap_or(DEFAULT_TOP_P);
        if !top_p.is_finite() || top_p <= 0.0 || top_p > 1.0 {
            return Err(SwitchyardError::InvalidInput(format!(
                "top_p must be in (0, 1], got {top_p}"
            )));
        }

        let upper = self.max_length_max.max(self.max_length_min);
        let max_length = match request.max_length {
            Some(requested) => {
                let clamped = requested.clamp(i64::from(self.max_length_min), i64::from(upper));
                u32::try_from(clamped).unwrap_or(upper)
            }
            None => DEFAULT_MAX_LENGTH.clamp(self.max_length_min, upper),
        };

        Ok(PreparedRequest {
            prompt: request.prompt.clone(),
            system_prompt: request
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature,
            top_p,
            max_length,
            scope: request.scope.clone(),
        })
    }
}
