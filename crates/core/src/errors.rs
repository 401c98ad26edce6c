use thiserror::Error;

use crate::gateway::VendorError;

/// Failures surfaced at the capability boundary. Everything below this layer
/// absorbs its own errors; this taxonomy exists so tool results carry a
/// stable class and a message that is safe to show the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no payment session for call {call_sid} and payment {payment_sid}")]
    SessionNotFound { call_sid: String, payment_sid: String },
    #[error(transparent)]
    Vendor(#[from] VendorError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CaptureError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::Vendor(VendorError::InvalidIdentifier { .. }) => {
                "invalid_input"
            }
            Self::SessionNotFound { .. } => "session_not_found",
            Self::Vendor(VendorError::CallNotActive { .. }) => "call_not_active",
            Self::Vendor(_) => "vendor_failure",
            Self::Internal(_) => "internal",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::Vendor(VendorError::InvalidIdentifier { .. }) => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::SessionNotFound { .. } => {
                "No payment capture is in progress for that call. Start a capture first."
            }
            Self::Vendor(VendorError::CallNotActive { .. }) => {
                "The call is no longer active, so payment details cannot be collected."
            }
            Self::Vendor(_) => {
                "The payment provider could not complete the request. Please retry shortly."
            }
            Self::Internal(_) => "An unexpected internal error occurred.",
        }
    }
}
