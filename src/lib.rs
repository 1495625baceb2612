//! tra-ticket library
//!
//! Taiwan Railway ticket workflows driven through a Chromium browser:
//! login, unpaid-order listing, cancellation and booking by train number.

pub mod config;
pub mod errors;
pub mod models;
pub mod service;
pub mod site;
pub mod telemetry;

use std::future::Future;

use cdp_adapter::{metrics, DriverManager};
use tracing::info;

pub use config::{AppConfig, Credentials};
pub use errors::{TraError, TraResult};
pub use models::{
    is_order_code, BookOrderData, BookingRequest, SeatPreference, SessionState, UserInfo,
};
pub use service::TrService;

/// Launch a browser from `cfg`, run `work` with a fresh service, then close the browser
/// whether `work` succeeded or not.
pub async fn with_browser<F, Fut, T>(cfg: AppConfig, work: F) -> TraResult<T>
where
    F: FnOnce(TrService) -> Fut,
    Fut: Future<Output = TraResult<T>>,
{
    let before = metrics::snapshot();
    let driver = DriverManager::new(cfg.browser.clone());
    let outcome = driver
        .scoped(|adapter| work(TrService::from_adapter(adapter, &cfg)))
        .await;

    let used = metrics::snapshot().since(&before);
    info!(
        commands = used.commands,
        failures = used.command_failures,
        navigations = used.navigations,
        mean_latency = ?used.mean_latency(),
        "browser session closed"
    );
    outcome
}
