//! TRA ticketing site contract
//!
//! Every URL, selector and text marker the workflows depend on. The remote
//! markup is not ours, so all coupling to it lives here.

use action_primitives::AnchorDescriptor;

pub const LOGIN_URL: &str =
    "https://www.railway.gov.tw/tra-tip-web/tip/tip008/tip811/memberLogin";
pub const PROFILE_URL: &str =
    "https://www.railway.gov.tw/tra-tip-web/tip/tip008/tip841/tip841profile";
pub const ORDER_SEARCH_URL: &str =
    "https://www.railway.gov.tw/tra-tip-web/tip/tip008/tip851/personView";
pub const BOOKING_QUERY_URL: &str =
    "https://www.railway.gov.tw/tra-tip-web/tip/tip001/tip123/query";
pub const TRAIN_LIST_URL: &str =
    "https://www.railway.gov.tw/tra-tip-web/tip/tip001/tip123/queryTrain";
pub const BOOKING_CONFIRM_URL: &str =
    "https://www.railway.gov.tw/tra-tip-web/tip/tip001/tip115/booking/modify";

/// Transient blocking layer shown while the site works.
pub const OVERLAY: &str = ".blockUI.blockOverlay";

pub mod login {
    pub const USERNAME: &str = "#username";
    pub const PASSWORD: &str = "#password";
    pub const SUBMIT: &str = "#submitBtn";
    pub const ERROR_PANEL: &str = "#errDiv.info-error";
    pub const ERROR_MESSAGE: &str = "#errDiv.info-error p.mag-error";
}

pub mod orders {
    pub const QUERY_FIELD: &str = "#queryField";
    pub const QUERY_FIELD_STATUS: &str = "ORDER_STATUS";
    pub const STATUS_FIELD: &str = "#personOrderStatus";
    /// Unpaid.
    pub const STATUS_UNPAID: &str = "ODS1";
    pub const SUBMIT: &str = "#submitdiv button";
    pub const ALERT: &str = ".alert.alert-warning p";
    pub const ROWS: &str = ".table.record-table tbody tr";
    pub const HEADER_CELL: &str = "th";
    pub const CELL: &str = "td";
    pub const ORDER_BUTTON: &str = "button";
    pub const CANCEL: &str = "#cancel";
    pub const CONFIRM_CANCEL: &str = ".btn.btn-danger";

    pub const NO_DATA_MARKER: &str = "[查無資料]";
    pub const CANCELLED_MARKER: &str = "已成功取消";
}

pub mod booking {
    pub const START_STATION: &str = "#startStation1";
    pub const END_STATION: &str = "#endStation1";
    pub const RIDE_DATE: &str = "#rideDate1";
    pub const TICKET_COUNT: &str = "#normalQty1";
    pub const TRAIN_NUMBER: &str = "#trainNoList1";
    pub const SEAT_WINDOW: &str = "label[for='seatPref2']";
    pub const SEAT_AISLE: &str = "label[for='seatPref3']";
    pub const QUERY_SUBMIT: &str = ".btn-sentgroup input[type='submit']";
    pub const QUERY_ERROR: &str = "#errorDiv";
    pub const QUERY_ERROR_MESSAGE: &str = "#errorDiv p.mag-error";
    pub const TRIP_MESSAGE: &str = ".search-trip .search-trip-mag p";
    pub const FIRST_ROUTE: &str = "label[for='route00']";
    pub const ROUTE_SUBMIT: &str = ".btn-sentgroup button[type='submit']";
    pub const CONFIRM_ERROR: &str = "#errDiv";
    pub const CONFIRM_ERROR_MESSAGE: &str = "#errDiv p.mag-error";
    pub const ORDER_NUMBER: &str = ".cartlist-id span";
    pub const SEAT: &str = ".seat";
    pub const TRAIN_INFO: &str = "th.train-trips";

    pub const NO_SEATS_MARKER: &str = "沒有空位";
    /// Ride date format of `#rideDate1`.
    pub const DATE_FORMAT: &str = "%Y/%m/%d";
}

/// Message used when an error panel appeared without readable text.
pub const UNKNOWN_ERROR: &str = "Unknown error";

pub fn css(selector: &str) -> AnchorDescriptor {
    AnchorDescriptor::css(selector)
}

pub fn tag(name: &str) -> AnchorDescriptor {
    AnchorDescriptor::tag(name)
}
