//! In-memory stand-in for the TRA site behind the `Navigator` seam.
//!
//! Conditions resolve instantly: a wait either finds its element on the
//! current page or times out. Every interaction is appended to a log the
//! tests assert on.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use action_primitives::{
    ActionError, AnchorDescriptor, ElementRef, Navigator, RaceCondition, RaceWinner,
};
use async_trait::async_trait;
use tra_ticket::site::{self, booking, login, orders};
use tra_ticket::TrService;

#[derive(Debug, Clone, PartialEq)]
enum Page {
    Blank,
    Login,
    LoginRejected(String),
    Profile,
    OrderSearch { queried: bool },
    OrderDetail(String),
    CancelConfirm(String),
    CancelResult(String),
    BookingQuery,
    QueryRejected(String),
    TrainList,
    ConfirmRejected(String),
    Payment,
}

#[derive(Debug)]
pub struct SiteState {
    page: Page,
    url: String,
    pub account: (String, String),
    /// Login submit leads nowhere.
    pub login_hangs: bool,
    /// `go_to` fails with this error.
    pub navigation_error: Option<ActionError>,
    pub unpaid: Vec<String>,
    /// Banner shown instead of the order table.
    pub order_alert: Option<String>,
    /// Data rows render with a single cell.
    pub malformed_rows: bool,
    /// Orders whose cancellation the site does not confirm.
    pub refuse_cancel: HashSet<String>,
    /// Orders whose detail button cannot be clicked.
    pub broken_buttons: HashSet<String>,
    pub seats_available: bool,
    pub query_error: Option<String>,
    pub confirm_error: Option<String>,
    pub ordernum: Option<String>,
    pub seat_text: String,
    pub train_info: String,
    pub log: Vec<String>,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            page: Page::Blank,
            url: "about:blank".to_string(),
            account: ("A123456789".to_string(), "correct-horse".to_string()),
            login_hangs: false,
            navigation_error: None,
            unpaid: Vec::new(),
            order_alert: None,
            malformed_rows: false,
            refuse_cancel: HashSet::new(),
            broken_buttons: HashSet::new(),
            seats_available: true,
            query_error: None,
            confirm_error: None,
            ordernum: Some("7654321".to_string()),
            seat_text: "7車12號".to_string(),
            train_info: "座位：\n自強(3000) \n434車次".to_string(),
            log: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, f: impl FnOnce(&mut SiteState)) -> &Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn service(&self) -> TrService {
        TrService::new(Arc::new(self.clone()))
    }

    /// Service that already went through a successful login.
    pub async fn logged_in_service(&self) -> TrService {
        let (user, pass) = self.state.lock().unwrap().account.clone();
        let mut service = self.service();
        assert!(service.login(&user, &pass).await, "fixture login failed");
        self.state.lock().unwrap().log.clear();
        service
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn logged(&self, entry: &str) -> bool {
        self.log().iter().any(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| *e == entry).count()
    }

    pub fn unpaid(&self) -> Vec<String> {
        self.state.lock().unwrap().unpaid.clone()
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

fn timeout(what: impl std::fmt::Display) -> ActionError {
    ActionError::WaitTimeout(format!("{what} not satisfied"))
}

impl SiteState {
    fn visit(&mut self, url: &str) {
        self.url = url.to_string();
        self.page = match url {
            site::LOGIN_URL => Page::Login,
            site::PROFILE_URL => Page::Profile,
            site::ORDER_SEARCH_URL => Page::OrderSearch { queried: false },
            site::BOOKING_QUERY_URL => Page::BookingQuery,
            site::TRAIN_LIST_URL => Page::TrainList,
            site::BOOKING_CONFIRM_URL => Page::Payment,
            _ => Page::Blank,
        };
    }

    fn listing_visible(&self) -> bool {
        matches!(self.page, Page::OrderSearch { queried: true })
            && self.order_alert.is_none()
            && !self.unpaid.is_empty()
    }

    /// Number of elements matching a document-level selector.
    fn count(&self, selector: &str) -> usize {
        let present = match (&self.page, selector) {
            (Page::Login | Page::LoginRejected(_), login::USERNAME | login::PASSWORD | login::SUBMIT) => true,
            (Page::LoginRejected(_), login::ERROR_PANEL | login::ERROR_MESSAGE) => true,
            (Page::OrderSearch { .. }, orders::QUERY_FIELD | orders::STATUS_FIELD | orders::SUBMIT) => true,
            (Page::OrderSearch { .. }, orders::ALERT) => self.alert_text().is_some(),
            (Page::OrderSearch { .. }, orders::ROWS) if self.listing_visible() => {
                return self.unpaid.len() + 1
            }
            (Page::OrderDetail(_), orders::CANCEL) => true,
            (Page::CancelConfirm(_), orders::CONFIRM_CANCEL) => true,
            (Page::CancelResult(_), orders::ALERT) => true,
            (
                Page::BookingQuery,
                booking::START_STATION
                | booking::END_STATION
                | booking::RIDE_DATE
                | booking::TICKET_COUNT
                | booking::TRAIN_NUMBER
                | booking::SEAT_WINDOW
                | booking::SEAT_AISLE
                | booking::QUERY_SUBMIT,
            ) => true,
            (Page::QueryRejected(_), booking::QUERY_ERROR | booking::QUERY_ERROR_MESSAGE) => true,
            (Page::TrainList, booking::TRIP_MESSAGE) => !self.seats_available,
            (Page::TrainList, booking::FIRST_ROUTE | booking::ROUTE_SUBMIT) => self.seats_available,
            (Page::ConfirmRejected(_), booking::CONFIRM_ERROR | booking::CONFIRM_ERROR_MESSAGE) => true,
            (Page::Payment, booking::ORDER_NUMBER) => self.ordernum.is_some(),
            (Page::Payment, booking::SEAT | booking::TRAIN_INFO) => true,
            _ => false,
        };
        usize::from(present)
    }

    fn alert_text(&self) -> Option<String> {
        match &self.page {
            Page::OrderSearch { queried: true } => match &self.order_alert {
                Some(text) => Some(text.clone()),
                None if self.unpaid.is_empty() => Some(orders::NO_DATA_MARKER.to_string()),
                None => None,
            },
            Page::CancelResult(code) => Some(if self.refuse_cancel.contains(code) {
                "訂單取消失敗，請稍後再試".to_string()
            } else {
                format!("訂票代碼{code}{}", orders::CANCELLED_MARKER)
            }),
            _ => None,
        }
    }

    fn text(&self, selector: &str) -> Option<String> {
        if self.count(selector) == 0 {
            return None;
        }
        match (&self.page, selector) {
            (Page::LoginRejected(msg), login::ERROR_MESSAGE) => Some(msg.clone()),
            (_, orders::ALERT) => self.alert_text(),
            (Page::QueryRejected(msg), booking::QUERY_ERROR_MESSAGE) => Some(msg.clone()),
            (Page::ConfirmRejected(msg), booking::CONFIRM_ERROR_MESSAGE) => Some(msg.clone()),
            (Page::TrainList, booking::TRIP_MESSAGE) => Some("很抱歉，本車次沒有空位".to_string()),
            (Page::Payment, booking::ORDER_NUMBER) => self.ordernum.clone(),
            (Page::Payment, booking::SEAT) => Some(self.seat_text.clone()),
            (Page::Payment, booking::TRAIN_INFO) => Some(self.train_info.clone()),
            _ => Some(String::new()),
        }
    }

    fn press(&mut self, selector: &str) {
        match (&self.page, selector) {
            (Page::Login | Page::LoginRejected(_), login::SUBMIT) => {
                if self.login_hangs {
                    return;
                }
                let typed = (
                    self.field(login::USERNAME),
                    self.field(login::PASSWORD),
                );
                if typed == self.account {
                    self.visit(site::PROFILE_URL);
                } else {
                    self.page = Page::LoginRejected("帳號或密碼錯誤".to_string());
                }
            }
            (Page::OrderSearch { .. }, orders::SUBMIT) => {
                self.page = Page::OrderSearch { queried: true };
            }
            (Page::OrderDetail(code), orders::CANCEL) => {
                self.page = Page::CancelConfirm(code.clone());
            }
            (Page::CancelConfirm(code), orders::CONFIRM_CANCEL) => {
                let code = code.clone();
                if !self.refuse_cancel.contains(&code) {
                    self.unpaid.retain(|c| *c != code);
                }
                self.page = Page::CancelResult(code);
            }
            (Page::BookingQuery, booking::QUERY_SUBMIT) => match self.query_error.clone() {
                Some(msg) => self.page = Page::QueryRejected(msg),
                None => self.visit(site::TRAIN_LIST_URL),
            },
            (Page::TrainList, booking::ROUTE_SUBMIT) => match self.confirm_error.clone() {
                Some(msg) => self.page = Page::ConfirmRejected(msg),
                None => self.visit(site::BOOKING_CONFIRM_URL),
            },
            _ => {}
        }
    }

    fn field(&self, selector: &str) -> String {
        let prefix = format!("fill:{selector}=");
        self.log
            .iter()
            .rev()
            .find_map(|entry| entry.strip_prefix(&prefix))
            .unwrap_or_default()
            .to_string()
    }

    fn condition(&self, condition: &RaceCondition) -> bool {
        match condition {
            RaceCondition::UrlEquals(url) => self.url == *url,
            RaceCondition::ElementPresent(anchor) => self.count(anchor.selector()) > 0,
        }
    }

    /// Order code shown in data row `row` (row 0 is the header).
    fn row_code(&self, row: usize) -> Option<String> {
        row.checked_sub(1).and_then(|i| self.unpaid.get(i).cloned())
    }
}

#[async_trait]
impl Navigator for FakeSite {
    async fn go_to(&self, url: &str) -> Result<(), ActionError> {
        self.record(format!("go_to:{url}"));
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.navigation_error.clone() {
            return Err(err);
        }
        state.visit(url);
        Ok(())
    }

    async fn wait_ready(&self) -> Result<(), ActionError> {
        Ok(())
    }

    async fn wait_for(
        &self,
        anchor: &AnchorDescriptor,
        _timeout: Option<Duration>,
    ) -> Result<ElementRef, ActionError> {
        if self.state.lock().unwrap().count(anchor.selector()) > 0 {
            Ok(anchor.nth(0))
        } else {
            Err(timeout(anchor))
        }
    }

    async fn wait_for_all(
        &self,
        anchor: &AnchorDescriptor,
        _timeout: Option<Duration>,
    ) -> Result<Vec<ElementRef>, ActionError> {
        let n = self.state.lock().unwrap().count(anchor.selector());
        if n == 0 {
            return Err(timeout(anchor));
        }
        Ok((0..n).map(|i| anchor.nth(i)).collect())
    }

    async fn wait_clickable(
        &self,
        anchor: &AnchorDescriptor,
        timeout_: Option<Duration>,
    ) -> Result<ElementRef, ActionError> {
        self.wait_for(anchor, timeout_).await
    }

    async fn click(
        &self,
        anchor: &AnchorDescriptor,
        timeout_: Option<Duration>,
    ) -> Result<(), ActionError> {
        self.wait_clickable(anchor, timeout_).await?;
        self.record(format!("click:{}", anchor.selector()));
        self.state.lock().unwrap().press(anchor.selector());
        Ok(())
    }

    async fn click_element(&self, element: &ElementRef) -> Result<(), ActionError> {
        self.record(format!("click_element:{element}"));
        let mut state = self.state.lock().unwrap();
        let row = element.path().steps()[0].index;
        let code = state
            .row_code(row)
            .ok_or_else(|| ActionError::AnchorNotFound(element.to_string()))?;
        if state.broken_buttons.contains(&code) {
            return Err(ActionError::NotClickable(element.to_string()));
        }
        state.page = Page::OrderDetail(code);
        Ok(())
    }

    async fn fill(
        &self,
        anchor: &AnchorDescriptor,
        text: &str,
        timeout_: Option<Duration>,
    ) -> Result<(), ActionError> {
        self.wait_for(anchor, timeout_).await?;
        self.record(format!("fill:{}={text}", anchor.selector()));
        Ok(())
    }

    async fn set_value(
        &self,
        anchor: &AnchorDescriptor,
        value: &str,
        timeout_: Option<Duration>,
    ) -> Result<(), ActionError> {
        self.wait_for(anchor, timeout_).await?;
        self.record(format!("set_value:{}={value}", anchor.selector()));
        Ok(())
    }

    async fn select_by_value(
        &self,
        anchor: &AnchorDescriptor,
        value: &str,
        timeout_: Option<Duration>,
    ) -> Result<(), ActionError> {
        self.wait_for(anchor, timeout_).await?;
        let known = matches!(
            (anchor.selector(), value),
            (orders::QUERY_FIELD, orders::QUERY_FIELD_STATUS)
                | (orders::STATUS_FIELD, orders::STATUS_UNPAID)
        );
        if !known {
            return Err(ActionError::OptionNotFound(value.to_string()));
        }
        self.record(format!("select:{}={value}", anchor.selector()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn wait_for_url(
        &self,
        expected: &str,
        _timeout: Option<Duration>,
    ) -> Result<bool, ActionError> {
        Ok(self.state.lock().unwrap().url == expected)
    }

    async fn wait_for_either(
        &self,
        first: &RaceCondition,
        second: &RaceCondition,
        _timeout: Option<Duration>,
    ) -> Result<RaceWinner, ActionError> {
        let state = self.state.lock().unwrap();
        if state.condition(first) {
            Ok(RaceWinner::First)
        } else if state.condition(second) {
            Ok(RaceWinner::Second)
        } else {
            Err(timeout(format!("{first} or {second}")))
        }
    }

    async fn element_text(
        &self,
        anchor: &AnchorDescriptor,
        _timeout: Option<Duration>,
    ) -> Result<Option<String>, ActionError> {
        Ok(self.state.lock().unwrap().text(anchor.selector()))
    }

    async fn wait_for_disappear(
        &self,
        _anchor: &AnchorDescriptor,
        _timeout: Option<Duration>,
    ) -> Result<bool, ActionError> {
        Ok(true)
    }

    async fn find_within(
        &self,
        parent: &ElementRef,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<ElementRef>, ActionError> {
        let state = self.state.lock().unwrap();
        if !state.listing_visible() {
            return Err(ActionError::AnchorNotFound(parent.to_string()));
        }
        let steps = parent.path().steps();
        let row = steps[0].index;
        let found = match (steps.len(), anchor.selector()) {
            (1, orders::HEADER_CELL) => usize::from(row == 0),
            (1, orders::CELL) if row == 0 => 0,
            (1, orders::CELL) if state.malformed_rows => 1,
            (1, orders::CELL) => 9,
            (2, orders::ORDER_BUTTON) if steps[1].index == 1 => 1,
            _ => 0,
        };
        Ok((0..found).map(|i| parent.child(anchor, i)).collect())
    }

    async fn text_of(&self, element: &ElementRef) -> Result<String, ActionError> {
        let state = self.state.lock().unwrap();
        state
            .row_code(element.path().steps()[0].index)
            .ok_or_else(|| ActionError::AnchorNotFound(element.to_string()))
    }

    async fn random_pause(&self) {
        self.record("pause".to_string());
    }

    async fn random_pause_long(&self) {
        self.record("pause_long".to_string());
    }
}
