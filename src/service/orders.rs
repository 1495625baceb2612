use std::collections::{BTreeMap, HashSet};

use action_primitives::ElementRef;
use tracing::{debug, error, info, instrument, warn};

use super::{TrService, ALERT_TIMEOUT, CONFIRM_TIMEOUT};
use crate::errors::{TraError, TraResult};
use crate::site::{self, css, orders, tag};

/// Unpaid-order query result.
enum UnpaidListing {
    /// The "no data" banner was shown.
    NoData,
    Rows(Vec<OrderRow>),
}

struct OrderRow {
    code: String,
    button: ElementRef,
}

impl TrService {
    /// Codes of the orders awaiting payment, in table order.
    #[instrument(name = "tr.fetch_unpaid", parent = &self.span, skip_all)]
    pub async fn fetch_order_wait_pay(&self) -> TraResult<Vec<String>> {
        self.ensure_logged_in("fetch unpaid orders")?;
        info!("fetching orders waiting for payment");

        match self.list_unpaid().await {
            Ok(UnpaidListing::NoData) => {
                info!("no orders waiting for payment");
                Ok(Vec::new())
            }
            Ok(UnpaidListing::Rows(rows)) => Ok(rows.into_iter().map(|row| row.code).collect()),
            Err(err) => {
                error!(%err, "error fetching orders");
                Err(err)
            }
        }
    }

    /// Cancel one unpaid order.
    ///
    /// `Ok(false)` when the order is not listed or the site did not confirm
    /// the cancellation.
    #[instrument(name = "tr.cancel", parent = &self.span, skip_all, fields(ordernum = %ordernum))]
    pub async fn cancel_order_with_ordernum(&self, ordernum: &str) -> TraResult<bool> {
        self.ensure_logged_in("cancel order")?;
        info!("cancelling order");

        let result = self.cancel_listed(ordernum).await;
        if let Err(err) = &result {
            error!(%err, "error cancelling order");
        }
        result
    }

    /// Cancel several orders one after another.
    ///
    /// Repeated codes are handled once. A failure on one code is recorded as
    /// `false` and the batch moves on.
    #[instrument(name = "tr.cancel_batch", parent = &self.span, skip_all)]
    pub async fn cancel_orders_with_ordernum<S>(&self, ordernums: &[S]) -> BTreeMap<String, bool>
    where
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = ordernums
            .iter()
            .map(AsRef::as_ref)
            .filter(|code| seen.insert(*code))
            .collect();
        info!(count = unique.len(), "cancelling orders");

        let mut results = BTreeMap::new();
        for (position, ordernum) in unique.iter().enumerate() {
            let cancelled = match self.cancel_order_with_ordernum(ordernum).await {
                Ok(cancelled) => cancelled,
                Err(err) => {
                    error!(ordernum, %err, "cancellation failed; continuing");
                    false
                }
            };
            results.insert(ordernum.to_string(), cancelled);

            if position + 1 < unique.len() {
                self.navigator().random_pause_long().await;
            }
        }
        results
    }

    async fn cancel_listed(&self, ordernum: &str) -> TraResult<bool> {
        let nav = self.navigator();

        let rows = match self.list_unpaid().await? {
            UnpaidListing::NoData => {
                warn!("no unpaid orders; nothing to cancel");
                return Ok(false);
            }
            UnpaidListing::Rows(rows) => rows,
        };
        let Some(row) = rows.into_iter().find(|row| row.code == ordernum) else {
            warn!("order not found for cancellation");
            return Ok(false);
        };

        nav.random_pause().await;
        nav.click_element(&row.button).await?;
        nav.wait_ready().await?;
        info!("order detail page loaded");

        nav.click(&css(orders::CANCEL), None).await?;
        nav.random_pause().await;
        info!("confirming cancellation");
        nav.click(&css(orders::CONFIRM_CANCEL), None).await?;
        nav.wait_ready().await?;

        let alert = nav
            .element_text(&css(orders::ALERT), Some(CONFIRM_TIMEOUT))
            .await?;
        match alert {
            Some(text) if text.contains(orders::CANCELLED_MARKER) => {
                info!("order cancelled");
                Ok(true)
            }
            other => {
                warn!(alert = ?other, "cancellation may have failed");
                Ok(false)
            }
        }
    }

    /// Submit the unpaid-orders query.
    async fn query_unpaid(&self) -> TraResult<()> {
        let nav = self.navigator();

        nav.go_to(site::ORDER_SEARCH_URL).await?;
        info!("order search page loaded");

        nav.wait_clickable(&css(orders::QUERY_FIELD), None).await?;
        nav.select_by_value(&css(orders::QUERY_FIELD), orders::QUERY_FIELD_STATUS, None)
            .await?;
        nav.wait_clickable(&css(orders::STATUS_FIELD), None).await?;
        nav.select_by_value(&css(orders::STATUS_FIELD), orders::STATUS_UNPAID, None)
            .await?;
        nav.random_pause().await;

        nav.click(&css(orders::SUBMIT), None).await?;
        self.wait_overlay_gone().await
    }

    async fn list_unpaid(&self) -> TraResult<UnpaidListing> {
        let nav = self.navigator();

        self.query_unpaid().await?;
        nav.random_pause().await;

        if let Some(text) = nav
            .element_text(&css(orders::ALERT), Some(ALERT_TIMEOUT))
            .await?
        {
            if text.contains(orders::NO_DATA_MARKER) {
                return Ok(UnpaidListing::NoData);
            }
            if !text.is_empty() {
                warn!(alert = %text, "unexpected alert while fetching orders");
                return Err(TraError::UnexpectedAlert(text));
            }
        }

        let rows = nav.wait_for_all(&css(orders::ROWS), None).await?;
        info!(rows = rows.len(), "order rows found");

        let mut listed = Vec::with_capacity(rows.len());
        for row in &rows {
            if !nav.find_within(row, &tag(orders::HEADER_CELL)).await?.is_empty() {
                continue;
            }
            let cells = nav.find_within(row, &tag(orders::CELL)).await?;
            let cell = cells.get(1).ok_or_else(|| {
                TraError::Format(format!("order row {row} has {} cells", cells.len()))
            })?;
            let button = nav
                .find_within(cell, &tag(orders::ORDER_BUTTON))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| TraError::Format(format!("no order button in {cell}")))?;
            let code = nav.text_of(&button).await?;
            debug!(code = %code, "order code found");
            listed.push(OrderRow { code, button });
        }
        Ok(UnpaidListing::Rows(listed))
    }
}
