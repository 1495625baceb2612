//! Error handling module
//!
//! One taxonomy for every workflow failure. Lower layers convert in through
//! `#[from]`; site-level outcomes get their own variants.

use action_primitives::ActionError;
use cdp_adapter::AdapterError;
use thiserror::Error;

pub type TraResult<T> = Result<T, TraError>;

#[derive(Debug, Error)]
pub enum TraError {
    /// Operation requires a logged-in session
    #[error("User not logged in")]
    NotLoggedIn,

    /// Order query showed a warning banner other than "no data"
    #[error("Unexpected alert message: {0}")]
    UnexpectedAlert(String),

    #[error("No available seats")]
    NoSeats,

    /// Site rejected the booking; carries the site's message
    #[error("Ticket ordering failed: {0}")]
    BookingRejected(String),

    /// Required element absent on a page we reached
    #[error("{0} not found")]
    MissingElement(String),

    /// Scraped text did not have the expected shape
    #[error("Unexpected format: {0}")]
    Format(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("Browser driver error: {0}")]
    Driver(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl TraError {
    /// Outcomes the site reported, as opposed to automation failures.
    pub fn is_site_outcome(&self) -> bool {
        matches!(
            self,
            TraError::UnexpectedAlert(_) | TraError::NoSeats | TraError::BookingRejected(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TraError::Action(err) if err.is_timeout())
    }
}
