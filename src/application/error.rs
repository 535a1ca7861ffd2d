// Errors raised by backend calls and studio commands
use crate::domain::error::ValidationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// HTTP 403. Routed to the permission prompt, never to an error toast.
    #[error("permission denied for {resource}")]
    Forbidden { resource: String },
    #[error("request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Forbidden { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("no widget with id {0}")]
    UnknownWidget(String),
    #[error("no widget is selected")]
    NothingSelected,
    #[error("dashboard has no id yet")]
    MissingDashboardId,
    #[error("nothing to undo or redo")]
    HistoryEmpty,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
