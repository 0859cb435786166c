pub mod geo;

/// Failure vocabulary shared by every dispatch component. The `code` string
/// is what clients switch on, both in REST error bodies and in socket
/// `actionFailed` frames.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Trip state changed underneath the request")]
    StaleState,
    #[error("Job already taken by another driver")]
    AlreadyAssigned,
    #[error("Job offer has expired")]
    OfferExpired,
    #[error("Actor is not a party to this trip")]
    NotAuthorized,
    #[error("Driver is offline, busy or not capable of this job")]
    DriverUnavailable,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "VALIDATION",
            DispatchError::InvalidTransition { .. } => "INVALID_TRANSITION",
            DispatchError::StaleState => "STALE_STATE",
            DispatchError::AlreadyAssigned => "ALREADY_ASSIGNED",
            DispatchError::OfferExpired => "OFFER_EXPIRED",
            DispatchError::NotAuthorized => "NOT_AUTHORIZED",
            DispatchError::DriverUnavailable => "DRIVER_UNAVAILABLE",
            DispatchError::NotFound(_) => "NOT_FOUND",
            DispatchError::Store(_) => "STORE",
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
