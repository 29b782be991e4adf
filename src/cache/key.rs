//! Cache key derivation.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::types::PreparedRequest;

/// Everything that identifies a generation request.
#[derive(Debug, Clone, Copy)]
pub struct KeyParts<'a> {
    pub prompt: &'a str,
    pub system_prompt: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    pub top_p: f64,
    pub max_length: u32,
    pub scope: Option<&'a str>,
}

/// SHA-256 digest of a generation request, rendered as lowercase hex.
///
/// Fields are fed to the hasher length-prefixed, so no choice of field
/// contents can make two different requests concatenate to the same bytes.
/// A missing scope and an empty scope hash differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a set of request fields.
    pub fn from_parts(parts: &KeyParts<'_>) -> Self {
        let mut h = Sha256::new();
        field(&mut h, parts.prompt.as_bytes());
        field(&mut h, parts.system_prompt.as_bytes());
        field(&mut h, parts.model.as_bytes());
        field(&mut h, &parts.temperature.to_bits().to_be_bytes());
        field(&mut h, &parts.top_p.to_bits().to_be_bytes());
        field(&mut h, &parts.max_length.to_be_bytes());
        match parts.scope {
            Some(scope) => {
                h.update([1u8]);
                field(&mut h, scope.as_bytes());
            }
            None => h.update([0u8]),
        }
        Self(hex::encode(h.finalize()))
    }

    /// Derive the key for a prepared request served by `model`.
    pub fn for_request(request: &PreparedRequest, model: &str) -> Self {
        Self::from_parts(&KeyParts {
            prompt: &request.prompt,
            system_prompt: &request.system_prompt,
            model,
            temperature: request.temperature,
            top_p: request.top_p,
            max_length: request.max_length,
            scope: request.scope.as_deref(),
        })
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn field(h: &mut Sha256, bytes: &[u8]) {
    h.update((bytes.len() as u64).to_be_bytes());
    h.update(bytes);
}
