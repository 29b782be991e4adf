use std::time::Duration;

use switchyard::{Result, SwitchyardError};

#[test]
fn test_error_display() {
    let err = SwitchyardError::Timeout {
        backend: "ollama".to_string(),
        after: Duration::from_secs(30),
    };
    let text = err.to_string();
    assert!(text.contains("ollama"));
    assert!(text.contains("30s"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(SwitchyardError::NoBackend)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn validation_errors() {
    assert!(SwitchyardError::InvalidInput("empty prompt".into()).is_validation());
    assert!(!SwitchyardError::NoBackend.is_validation());
    assert!(!SwitchyardError::LocalGeneration("oom".into()).is_validation());
}

#[test]
fn download_conflict_is_not_a_validation_error() {
    let err = SwitchyardError::DownloadInProgress {
        running: "org/a".into(),
    };
    assert!(!err.is_validation());
    assert_eq!(err.to_string(), "a download of org/a is already in progress");
}

#[test]
fn model_not_cached_names_the_model() {
    let err = SwitchyardError::ModelNotCached("org/m".into());
    assert!(!err.is_validation());
    assert!(err.to_string().contains("org/m"));
}

// ============================================================================
// Conversions
// ============================================================================

#[test]
fn json_errors_convert() {
    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    assert!(matches!(SwitchyardError::from(json_err), SwitchyardError::Json(_)));
}

#[test]
fn storage_errors_convert() {
    let err: SwitchyardError = rusqlite::Error::QueryReturnedNoRows.into();
    assert!(matches!(err, SwitchyardError::Storage(_)));
    assert!(err.to_string().starts_with("storage error"));
}
