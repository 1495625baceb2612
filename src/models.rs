//! Data model shared by the workflows

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{TraError, TraResult};
use crate::site;

/// Login state of one service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub is_logged_in: bool,
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
}

/// True for the 7-digit codes the site uses for orders.
pub fn is_order_code(code: &str) -> bool {
    code.len() == 7 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Result of a completed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookOrderData {
    pub ordernum: String,
    pub trainnum: String,
    pub traintype: String,
    pub carriage: String,
    pub seat: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatPreference {
    #[default]
    None,
    Window,
    Aisle,
}

impl SeatPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatPreference::None => "none",
            SeatPreference::Window => "window",
            SeatPreference::Aisle => "aisle",
        }
    }

    /// Label to click for this preference; `None` leaves the form untouched.
    pub fn label_selector(&self) -> Option<&'static str> {
        match self {
            SeatPreference::None => None,
            SeatPreference::Window => Some(site::booking::SEAT_WINDOW),
            SeatPreference::Aisle => Some(site::booking::SEAT_AISLE),
        }
    }
}

impl fmt::Display for SeatPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatPreference {
    type Err = TraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SeatPreference::None),
            "window" => Ok(SeatPreference::Window),
            "aisle" => Ok(SeatPreference::Aisle),
            other => Err(TraError::InvalidInput(format!(
                "unknown seat preference '{other}'"
            ))),
        }
    }
}

/// Booking by train number.
///
/// Station fields take the site's station codes (`"1000"` for Taipei,
/// `"0900-基隆"` style values are accepted as typed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub start_station: String,
    pub end_station: String,
    pub ride_date: NaiveDate,
    pub amount: u32,
    pub train_number: String,
    #[serde(default)]
    pub seat_preference: SeatPreference,
}

impl BookingRequest {
    pub fn new(
        start_station: impl Into<String>,
        end_station: impl Into<String>,
        ride_date: NaiveDate,
        amount: u32,
        train_number: impl Into<String>,
    ) -> Self {
        Self {
            start_station: start_station.into(),
            end_station: end_station.into(),
            ride_date,
            amount,
            train_number: train_number.into(),
            seat_preference: SeatPreference::None,
        }
    }

    pub fn with_seat_preference(mut self, preference: SeatPreference) -> Self {
        self.seat_preference = preference;
        self
    }

    /// Ride date as `#rideDate1` expects it.
    pub fn ride_date_text(&self) -> String {
        self.ride_date.format(site::booking::DATE_FORMAT).to_string()
    }

    pub fn validate(&self) -> TraResult<()> {
        if self.start_station.trim().is_empty() {
            return Err(TraError::InvalidInput("start station is empty".into()));
        }
        if self.end_station.trim().is_empty() {
            return Err(TraError::InvalidInput("end station is empty".into()));
        }
        if self.train_number.trim().is_empty() {
            return Err(TraError::InvalidInput("train number is empty".into()));
        }
        if self.amount == 0 {
            return Err(TraError::InvalidInput(
                "at least one ticket is required".into(),
            ));
        }
        Ok(())
    }
}
