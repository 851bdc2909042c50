use thiserror::Error;

use crate::models::Principal;

/// Failures of the answer-delivery core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The principal already has a request being processed. Not a fault.
    #[error("principal {0} already has a request in flight")]
    AlreadyInFlight(Principal),

    #[error("markup re-encoding failed: {0}")]
    SanitizationFailure(String),

    #[error("delivery pipeline failed: {0}")]
    PipelineFailure(String),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
