//! Navigator - the element-level interaction seam the workflows are written against
//!
//! Every wait polls at [`POLL_INTERVAL`](crate::POLL_INTERVAL) and is bounded by
//! an explicit timeout; `None` means the configured default wait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{Cdp, ElementPath, SelectSpec, Timeouts};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    errors::ActionError,
    pacing::Pacing,
    types::{AnchorDescriptor, ElementRef, RaceCondition, RaceWinner},
    waiting::poll_until,
};

#[async_trait]
pub trait Navigator: Send + Sync {
    /// Load `url` and wait for the document to finish loading.
    async fn go_to(&self, url: &str) -> Result<(), ActionError>;

    /// Wait until `document.readyState` is `complete`.
    async fn wait_ready(&self) -> Result<(), ActionError>;

    /// Wait until at least one element matches; returns the first.
    async fn wait_for(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<ElementRef, ActionError>;

    /// Wait until at least one element matches; returns all matches in document order.
    async fn wait_for_all(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Vec<ElementRef>, ActionError>;

    /// Wait until the first match is visible and enabled.
    async fn wait_clickable(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<ElementRef, ActionError>;

    async fn click(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError>;

    async fn click_element(&self, element: &ElementRef) -> Result<(), ActionError>;

    /// Clear the field and type `text` into it.
    async fn fill(
        &self,
        anchor: &AnchorDescriptor,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError>;

    /// Assign the `value` property by script, without keystrokes.
    async fn set_value(
        &self,
        anchor: &AnchorDescriptor,
        value: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError>;

    async fn select_by_value(
        &self,
        anchor: &AnchorDescriptor,
        value: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError>;

    async fn current_url(&self) -> Result<String, ActionError>;

    /// `Ok(false)` when the URL never matched within the timeout.
    async fn wait_for_url(
        &self,
        expected: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, ActionError>;

    /// Poll both conditions until one holds. `first` is checked before `second` on every tick.
    async fn wait_for_either(
        &self,
        first: &RaceCondition,
        second: &RaceCondition,
        timeout: Option<Duration>,
    ) -> Result<RaceWinner, ActionError>;

    async fn wait_for_url_or_element(
        &self,
        expected_url: &str,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<RaceWinner, ActionError> {
        self.wait_for_either(
            &RaceCondition::UrlEquals(expected_url.to_string()),
            &RaceCondition::ElementPresent(anchor.clone()),
            timeout,
        )
        .await
    }

    /// Visible text of the first match, or `None` when nothing matched in time.
    async fn element_text(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, ActionError>;

    /// `Ok(false)` when the element was still shown when the timeout hit.
    async fn wait_for_disappear(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<bool, ActionError>;

    /// Matches of `anchor` below `parent`, in document order.
    async fn find_within(
        &self,
        parent: &ElementRef,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<ElementRef>, ActionError>;

    /// Visible text of an element, trimmed.
    async fn text_of(&self, element: &ElementRef) -> Result<String, ActionError>;

    async fn random_pause(&self);

    async fn random_pause_long(&self);
}

/// [`Navigator`] over a CDP adapter.
pub struct DefaultNavigator {
    cdp: Arc<dyn Cdp>,
    timeouts: Timeouts,
    pacing: Pacing,
}

impl DefaultNavigator {
    pub fn new(cdp: Arc<dyn Cdp>, timeouts: Timeouts, pacing: Pacing) -> Self {
        Self {
            cdp,
            timeouts,
            pacing,
        }
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    fn wait_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.timeouts.wait())
    }

    /// Evaluate a read-only probe. Script failures mid-navigation count as "not yet".
    async fn probe(&self, expression: &str) -> Option<Value> {
        match self.cdp.evaluate_script(expression).await {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(%err, "probe failed; retrying");
                None
            }
        }
    }

    async fn count(&self, anchor: &AnchorDescriptor) -> usize {
        self.probe(&count_expression(anchor))
            .await
            .and_then(|value| value.as_u64())
            .unwrap_or(0) as usize
    }

    async fn is_clickable(&self, element: &ElementRef) -> bool {
        matches!(
            self.probe(&clickable_expression(element.path())).await,
            Some(Value::Bool(true))
        )
    }

    async fn condition_met(&self, condition: &RaceCondition) -> bool {
        match condition {
            RaceCondition::UrlEquals(expected) => match self.cdp.current_url().await {
                Ok(url) => url == *expected,
                Err(err) => {
                    debug!(%err, "current url unavailable");
                    false
                }
            },
            RaceCondition::ElementPresent(anchor) => self.count(anchor).await > 0,
        }
    }

    async fn pause(&self, delay: Duration, kind: &'static str) {
        if delay.is_zero() {
            return;
        }
        info!(kind, delay_ms = delay.as_millis() as u64, "random pause");
        sleep(delay).await;
    }
}

#[async_trait]
impl Navigator for DefaultNavigator {
    async fn go_to(&self, url: &str) -> Result<(), ActionError> {
        url::Url::parse(url)
            .map_err(|err| ActionError::Internal(format!("invalid url '{url}': {err}")))?;
        info!(url, "navigate");
        self.cdp.navigate(url, self.timeouts.page_load()).await?;
        Ok(())
    }

    async fn wait_ready(&self) -> Result<(), ActionError> {
        let this = self;
        poll_until(
            "document ready",
            self.timeouts.page_load(),
            move || async move {
                let state = this.probe("document.readyState").await;
                Ok(matches!(state, Some(Value::String(s)) if s == "complete").then_some(()))
            },
        )
        .await
        .map_err(|err| match err {
            ActionError::WaitTimeout(msg) => ActionError::NavTimeout(msg),
            other => other,
        })
    }

    async fn wait_for(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<ElementRef, ActionError> {
        let this = self;
        poll_until(
            &format!("presence of {anchor}"),
            self.wait_timeout(timeout),
            move || async move { Ok((this.count(anchor).await > 0).then(|| anchor.nth(0))) },
        )
        .await
    }

    async fn wait_for_all(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Vec<ElementRef>, ActionError> {
        let this = self;
        let found = poll_until(
            &format!("presence of all {anchor}"),
            self.wait_timeout(timeout),
            move || async move {
                let n = this.count(anchor).await;
                Ok((n > 0).then_some(n))
            },
        )
        .await?;
        Ok((0..found).map(|index| anchor.nth(index)).collect())
    }

    async fn wait_clickable(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<ElementRef, ActionError> {
        let this = self;
        let element = anchor.nth(0);
        let candidate = &element;
        poll_until(
            &format!("clickable {anchor}"),
            self.wait_timeout(timeout),
            move || async move { Ok(this.is_clickable(candidate).await.then(|| candidate.clone())) },
        )
        .await
    }

    async fn click(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        let element = self.wait_clickable(anchor, timeout).await.map_err(|err| {
            error!(%anchor, %err, "click timeout");
            err
        })?;
        debug!(%anchor, "click");
        self.cdp
            .click(element.path(), self.wait_timeout(timeout))
            .await?;
        Ok(())
    }

    async fn click_element(&self, element: &ElementRef) -> Result<(), ActionError> {
        let this = self;
        poll_until(
            &format!("clickable {element}"),
            self.timeouts.wait(),
            move || async move { Ok(this.is_clickable(element).await.then_some(())) },
        )
        .await
        .map_err(|err| {
            error!(%element, %err, "click element timeout");
            err
        })?;
        debug!(%element, "click element");
        self.cdp.click(element.path(), self.timeouts.wait()).await?;
        Ok(())
    }

    async fn fill(
        &self,
        anchor: &AnchorDescriptor,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        let element = self.wait_for(anchor, timeout).await.map_err(|err| {
            error!(%anchor, %err, "fill timeout");
            err
        })?;
        self.cdp
            .type_text(element.path(), text, true, self.wait_timeout(timeout))
            .await?;
        Ok(())
    }

    async fn set_value(
        &self,
        anchor: &AnchorDescriptor,
        value: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        let element = self.wait_for(anchor, timeout).await?;
        let assigned = self
            .cdp
            .evaluate_script(&assign_value_expression(element.path(), value))
            .await?;
        if assigned != Value::Bool(true) {
            return Err(ActionError::AnchorNotFound(format!(
                "{anchor} detached before value assignment"
            )));
        }
        Ok(())
    }

    async fn select_by_value(
        &self,
        anchor: &AnchorDescriptor,
        value: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        let element = self.wait_for(anchor, timeout).await.map_err(|err| {
            error!(%anchor, %err, "select dropdown timeout");
            err
        })?;
        self.cdp
            .select_option(
                SelectSpec::by_value(element.path().clone(), value),
                self.wait_timeout(timeout),
            )
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.cdp.current_url().await?)
    }

    async fn wait_for_url(
        &self,
        expected: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, ActionError> {
        let this = self;
        let condition = RaceCondition::UrlEquals(expected.to_string());
        let condition = &condition;
        match poll_until(
            &condition.to_string(),
            self.wait_timeout(timeout),
            move || async move { Ok(this.condition_met(condition).await.then_some(())) },
        )
        .await
        {
            Ok(()) => Ok(true),
            Err(ActionError::WaitTimeout(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn wait_for_either(
        &self,
        first: &RaceCondition,
        second: &RaceCondition,
        timeout: Option<Duration>,
    ) -> Result<RaceWinner, ActionError> {
        let this = self;
        poll_until(
            &format!("{first} or {second}"),
            self.wait_timeout(timeout),
            move || async move {
                if this.condition_met(first).await {
                    return Ok(Some(RaceWinner::First));
                }
                if this.condition_met(second).await {
                    return Ok(Some(RaceWinner::Second));
                }
                Ok(None)
            },
        )
        .await
        .map_err(|err| {
            error!(%first, %second, %err, "neither outcome observed");
            err
        })
    }

    async fn element_text(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, ActionError> {
        match self.wait_for(anchor, timeout).await {
            Ok(element) => self.text_of(&element).await.map(Some),
            Err(ActionError::WaitTimeout(_)) => {
                warn!(%anchor, "element not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn wait_for_disappear(
        &self,
        anchor: &AnchorDescriptor,
        timeout: Option<Duration>,
    ) -> Result<bool, ActionError> {
        let this = self;
        let expression = hidden_expression(anchor);
        let expression = expression.as_str();
        let result = poll_until(
            &format!("invisibility of {anchor}"),
            self.wait_timeout(timeout),
            move || async move {
                Ok(matches!(this.probe(expression).await, Some(Value::Bool(true))).then_some(()))
            },
        )
        .await;
        match result {
            Ok(()) => Ok(true),
            Err(ActionError::WaitTimeout(_)) => {
                warn!(%anchor, "element did not disappear");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn find_within(
        &self,
        parent: &ElementRef,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<ElementRef>, ActionError> {
        let cdp = &self.cdp;
        let expression = count_within_expression(parent.path(), anchor);
        let expression = expression.as_str();
        let found = poll_until(
            &format!("{anchor} within {parent}"),
            self.timeouts.implicit(),
            move || async move {
                let count = cdp
                    .evaluate_script(expression)
                    .await?
                    .as_i64()
                    .unwrap_or(-1);
                if count < 0 {
                    return Err(ActionError::AnchorNotFound(format!(
                        "{parent} is no longer attached"
                    )));
                }
                Ok((count > 0).then_some(count as usize))
            },
        )
        .await;

        match found {
            Ok(count) => Ok((0..count).map(|index| parent.child(anchor, index)).collect()),
            Err(ActionError::WaitTimeout(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn text_of(&self, element: &ElementRef) -> Result<String, ActionError> {
        match self
            .cdp
            .evaluate_script(&text_expression(element.path()))
            .await?
        {
            Value::String(text) => Ok(text.trim().to_string()),
            _ => Err(ActionError::AnchorNotFound(format!(
                "{element} is no longer attached"
            ))),
        }
    }

    async fn random_pause(&self) {
        self.pause(self.pacing.short_delay(), "short").await;
    }

    async fn random_pause_long(&self) {
        self.pause(self.pacing.long_delay(), "long").await;
    }
}

const IS_SHOWN_FN: &str = "const isShown = (el) => { if (!el || !el.isConnected) { return false; } const rect = el.getBoundingClientRect(); const style = window.getComputedStyle(el); return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none'; };";

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn count_expression(anchor: &AnchorDescriptor) -> String {
    format!(
        "document.querySelectorAll({}).length",
        js_string(anchor.selector())
    )
}

fn count_within_expression(parent: &ElementPath, anchor: &AnchorDescriptor) -> String {
    format!(
        "(() => {{ const p = {}; if (!p) {{ return -1; }} return p.querySelectorAll({}).length; }})()",
        parent.resolve_expression(),
        js_string(anchor.selector())
    )
}

fn clickable_expression(path: &ElementPath) -> String {
    format!(
        "(() => {{ {IS_SHOWN_FN} const el = {}; return isShown(el) && !el.disabled; }})()",
        path.resolve_expression()
    )
}

fn hidden_expression(anchor: &AnchorDescriptor) -> String {
    format!(
        "(() => {{ {IS_SHOWN_FN} return !isShown(document.querySelector({})); }})()",
        js_string(anchor.selector())
    )
}

fn text_expression(path: &ElementPath) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) {{ return null; }} return el.innerText ?? el.textContent ?? ''; }})()",
        path.resolve_expression()
    )
}

fn assign_value_expression(path: &ElementPath, value: &str) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) {{ return false; }} el.value = {}; return true; }})()",
        path.resolve_expression(),
        js_string(value)
    )
}
