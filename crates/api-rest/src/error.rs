use axum::http::StatusCode;
use lims_core::CoreError;

pub(crate) type ApiError = (StatusCode, String);

/// Maps a core error onto a response. Client errors carry the error message; anything else is
/// logged and reported as a bare 500.
pub(crate) fn from_core(operation: &'static str, e: CoreError) -> ApiError {
    match e {
        CoreError::InvalidInput(_)
        | CoreError::InvalidId(_)
        | CoreError::InvalidText(_)
        | CoreError::Condition(_)
        | CoreError::InvalidAction(_)
        | CoreError::Interpret(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        CoreError::Conflict(_) | CoreError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, e.to_string())
        }
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        _ => {
            tracing::error!("{} error: {:?}", operation, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    }
}

pub(crate) fn no_standard() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        "No applicable breakpoint standard".into(),
    )
}
