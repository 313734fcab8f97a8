use core::error::Error;

use error_stack::Report;
use poem::error::ResponseError;
use poem::http::StatusCode;

use crate::domain::CoordinatorError;
use crate::domain::ModelError;

/// API errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Pod not found: {qualified_name}")]
    PodNotFound { qualified_name: String },
    #[display("Request conflicts with model state: {message}")]
    Conflict { message: String },
    #[display("Model unavailable: {message}")]
    Unavailable { message: String },
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}

impl ResponseError for ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::PodNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Report<CoordinatorError>> for ApiError {
    fn from(report: Report<CoordinatorError>) -> Self {
        match report.current_context() {
            CoordinatorError::Rejected(ModelError::PodNotFound { qualified_name }) => {
                Self::PodNotFound {
                    qualified_name: qualified_name.clone(),
                }
            }
            CoordinatorError::Rejected(e) => {
                tracing::error!("Rejected model operation: {report:?}");
                Self::Conflict {
                    message: e.to_string(),
                }
            }
            CoordinatorError::Unavailable | CoordinatorError::ReplyDropped => {
                tracing::error!("Model coordinator unavailable: {report:?}");
                Self::Unavailable {
                    message: report.current_context().to_string(),
                }
            }
        }
    }
}
