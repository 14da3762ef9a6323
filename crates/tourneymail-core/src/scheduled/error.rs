//! Delivery error taxonomy

use thiserror::Error;

/// Errors that end the processing of a whole campaign
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// A business precondition does not hold; nothing was sent
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    /// The audience could not be computed; nothing was sent
    #[error("Recipient resolution failed: {0}")]
    Resolution(String),

    /// The outbound transport cannot be reached; items stay pending
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tourneymail_common::Error),
}

impl DeliveryError {
    /// Errors that move an item to `failed` rather than leaving it pending
    pub fn fails_item(&self) -> bool {
        matches!(
            self,
            DeliveryError::PreconditionNotMet(_) | DeliveryError::Resolution(_)
        )
    }
}

/// Outcome of a single failed send
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    /// Hard bounce reported by the relay
    #[error("Bounced: {0}")]
    Bounced(String),

    #[error("Temporary failure: {0}")]
    Temporary(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),
}
