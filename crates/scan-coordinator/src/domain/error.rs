use thiserror::Error;

use super::scan::ScanStatus;

/// Error type for model operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Pod not found: {qualified_name}")]
    PodNotFound { qualified_name: String },

    #[error("Image not registered: {sha}")]
    ImageNotFound { sha: String },

    #[error(
        "Invalid transition for image {sha}: {operation} expects one of [{}], found {actual}",
        status_list(.expected)
    )]
    InvalidTransition {
        sha: String,
        operation: &'static str,
        expected: Vec<ScanStatus>,
        actual: ScanStatus,
    },
}

impl ModelError {
    /// Whether the error means the caller and the model disagree about an
    /// image's state, as opposed to an ordinary lookup miss.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ImageNotFound { .. } | Self::InvalidTransition { .. }
        )
    }
}

/// Comma separated status names, in the same snake_case form as `Display`.
pub(crate) fn status_list(statuses: &[ScanStatus]) -> String {
    statuses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
