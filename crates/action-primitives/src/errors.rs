//! Error types for navigator operations

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Page load did not complete in time
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// Explicit wait ran out before its condition held
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Element is present but hidden, disabled or covered
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    #[error("Option not found in dropdown: {0}")]
    OptionNotFound(String),

    /// Element could not be resolved (absent, or its container went stale)
    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_) | ActionError::NotClickable(_) | ActionError::CdpIo(_)
        )
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) => 3,
            ActionError::NavTimeout(_) | ActionError::CdpIo(_) => 2,
            ActionError::WaitTimeout(_) | ActionError::AnchorNotFound(_) => 1,
            ActionError::NotClickable(_) | ActionError::OptionNotFound(_) => 0,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::NavTimeout(_) | ActionError::WaitTimeout(_))
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(message),
            AdapterErrorKind::TargetNotFound => ActionError::AnchorNotFound(message),
            AdapterErrorKind::NotInteractable => ActionError::NotClickable(message),
            AdapterErrorKind::OptionNotFound => ActionError::OptionNotFound(message),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(message),
            AdapterErrorKind::Internal => ActionError::Internal(message),
        }
    }
}
