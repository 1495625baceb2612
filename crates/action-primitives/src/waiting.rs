//! Fixed-interval polling shared by every explicit wait

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::errors::ActionError;

/// Interval between two probes of a wait condition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run `probe` until it yields `Some`, an error, or `timeout` elapses.
///
/// The probe always runs at least once, so a zero timeout still checks the
/// current state.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    mut probe: F,
) -> Result<T, ActionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ActionError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(ActionError::WaitTimeout(format!(
                "{what} not satisfied within {}ms",
                timeout.as_millis()
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}
