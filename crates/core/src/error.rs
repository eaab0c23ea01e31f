use lims_types::{IdError, TextError};

/// Errors raised by the core services and repositories.
///
/// "No applicable breakpoint standard" is deliberately absent: lookups return `Ok(None)` and
/// the caller decides how to surface it.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
    #[error("invalid text: {0}")]
    InvalidText(#[from] TextError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid condition: {0}")]
    Condition(#[from] crate::rules::ConditionError),
    #[error("invalid rule action: {0}")]
    InvalidAction(#[from] crate::rules::ActionError),
    #[error("cannot interpret measurement: {0}")]
    Interpret(#[from] crate::breakpoints::InterpretError),
    #[error("invalid lab result transition from {from} to {to}")]
    InvalidTransition {
        from: crate::lab_result::ValidationStatus,
        to: crate::lab_result::ValidationStatus,
    },
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML at {path}: {source}", path = path.display())]
    YamlDeserialization {
        path: std::path::PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_yaml::Error>,
    },
    #[error("failed to serialize JSON: {0}")]
    JsonSerialization(serde_json::Error),
    #[error("record store lock poisoned")]
    LockPoisoned,
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
