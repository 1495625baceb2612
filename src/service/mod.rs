//! TRA account workflows
//!
//! A [`TrService`] owns one navigator and one login session. Operations are
//! issued one at a time; every one of them runs inside the service's span.

mod booking;
mod login;
mod orders;
pub mod parse;

use std::sync::Arc;
use std::time::Duration;

use action_primitives::{DefaultNavigator, Navigator};
use cdp_adapter::{Cdp, CdpAdapter};
use tracing::{info_span, warn, Span};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{TraError, TraResult};
use crate::models::SessionState;
use crate::site::{self, css};

/// Bound for racing a success page against an error panel.
pub const OUTCOME_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound for reading an optional banner.
pub const ALERT_TIMEOUT: Duration = Duration::from_secs(2);
/// Bound for reading confirmation results.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TrService {
    navigator: Arc<dyn Navigator>,
    session: SessionState,
    span: Span,
}

impl TrService {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        let span = info_span!("tr_service", session = %Uuid::new_v4());
        Self::with_span(navigator, span)
    }

    pub fn with_span(navigator: Arc<dyn Navigator>, span: Span) -> Self {
        Self {
            navigator,
            session: SessionState::default(),
            span,
        }
    }

    /// Service driving a started adapter with the configured timeouts and pacing.
    pub fn from_adapter(adapter: Arc<CdpAdapter>, cfg: &AppConfig) -> Self {
        let navigator = DefaultNavigator::new(
            adapter as Arc<dyn Cdp>,
            cfg.browser.timeouts.clone(),
            cfg.pacing.clone(),
        );
        Self::new(Arc::new(navigator))
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    fn ensure_logged_in(&self, operation: &str) -> TraResult<()> {
        if self.session.is_logged_in {
            Ok(())
        } else {
            warn!(operation, "user not logged in");
            Err(TraError::NotLoggedIn)
        }
    }

    /// Wait out the blocking overlay. A stuck overlay is logged by the navigator and ignored.
    async fn wait_overlay_gone(&self) -> TraResult<()> {
        self.navigator()
            .wait_for_disappear(&css(site::OVERLAY), None)
            .await?;
        Ok(())
    }

    /// Text of an error message element, or the generic message when it has none.
    async fn message_or_unknown(&self, selector: &str) -> TraResult<String> {
        let text = self.navigator().element_text(&css(selector), None).await?;
        Ok(text
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| site::UNKNOWN_ERROR.to_string()))
    }
}
