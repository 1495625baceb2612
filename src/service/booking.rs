use action_primitives::RaceWinner;
use tracing::{error, info, instrument, warn};

use super::parse::{parse_carriage_seat, parse_train_info};
use super::{TrService, ALERT_TIMEOUT, CONFIRM_TIMEOUT, OUTCOME_TIMEOUT};
use crate::errors::{TraError, TraResult};
use crate::models::{BookOrderData, BookingRequest};
use crate::site::{self, booking, css};

impl TrService {
    /// Book tickets on one train and return the unpaid order it created.
    #[instrument(
        name = "tr.book",
        parent = &self.span,
        skip_all,
        fields(train = %request.train_number, date = %request.ride_date_text())
    )]
    pub async fn order_with_trainnum(&self, request: &BookingRequest) -> TraResult<BookOrderData> {
        self.ensure_logged_in("book ticket")?;
        request.validate()?;
        info!(
            start = %request.start_station,
            end = %request.end_station,
            amount = request.amount,
            seat = %request.seat_preference,
            "ordering tickets"
        );

        let result = self.book(request).await;
        if let Err(err) = &result {
            error!(%err, "error placing order");
        }
        result
    }

    async fn book(&self, request: &BookingRequest) -> TraResult<BookOrderData> {
        let nav = self.navigator();

        nav.go_to(site::BOOKING_QUERY_URL).await?;
        info!("ticket query page loaded");

        self.fill_field(booking::START_STATION, &request.start_station)
            .await?;
        self.fill_field(booking::END_STATION, &request.end_station)
            .await?;
        // typing into the date picker gets mangled
        nav.wait_clickable(&css(booking::RIDE_DATE), None).await?;
        nav.set_value(&css(booking::RIDE_DATE), &request.ride_date_text(), None)
            .await?;
        self.fill_field(booking::TICKET_COUNT, &request.amount.to_string())
            .await?;
        self.fill_field(booking::TRAIN_NUMBER, &request.train_number)
            .await?;
        if let Some(label) = request.seat_preference.label_selector() {
            info!(seat = %request.seat_preference, "selecting seat preference");
            nav.click(&css(label), None).await?;
        }
        nav.random_pause().await;

        info!("submitting ticket query");
        nav.click(&css(booking::QUERY_SUBMIT), None).await?;
        nav.wait_ready().await?;
        self.expect_page(
            site::TRAIN_LIST_URL,
            booking::QUERY_ERROR,
            booking::QUERY_ERROR_MESSAGE,
        )
        .await?;
        info!("train list loaded");
        self.wait_overlay_gone().await?;

        if let Some(text) = nav
            .element_text(&css(booking::TRIP_MESSAGE), Some(ALERT_TIMEOUT))
            .await?
        {
            if text.contains(booking::NO_SEATS_MARKER) {
                warn!(message = %text, "no available seats");
                return Err(TraError::NoSeats);
            }
        }

        nav.click(&css(booking::FIRST_ROUTE), None).await?;
        nav.random_pause().await;
        info!("submitting route selection");
        nav.click(&css(booking::ROUTE_SUBMIT), None).await?;
        self.expect_page(
            site::BOOKING_CONFIRM_URL,
            booking::CONFIRM_ERROR,
            booking::CONFIRM_ERROR_MESSAGE,
        )
        .await?;
        info!("payment page loaded");
        self.wait_overlay_gone().await?;

        let ordernum = self
            .required_text(booking::ORDER_NUMBER, "Order number")
            .await?;
        let seat_text = self
            .required_text(booking::SEAT, "Carriage and seat information")
            .await?;
        let train_text = self
            .required_text(booking::TRAIN_INFO, "Train information")
            .await?;

        let (traintype, trainnum) = parse_train_info(&train_text)?;
        let (carriage, seat) = parse_carriage_seat(&seat_text)?;
        info!(%ordernum, %trainnum, %carriage, %seat, "order placed");

        Ok(BookOrderData {
            ordernum,
            trainnum,
            traintype,
            carriage,
            seat,
        })
    }

    async fn fill_field(&self, selector: &str, value: &str) -> TraResult<()> {
        let nav = self.navigator();
        nav.wait_clickable(&css(selector), None).await?;
        nav.fill(&css(selector), value, None).await?;
        Ok(())
    }

    /// Race `url` against the error panel; the panel becomes `BookingRejected`.
    async fn expect_page(&self, url: &str, error_panel: &str, error_message: &str) -> TraResult<()> {
        let winner = self
            .navigator()
            .wait_for_url_or_element(url, &css(error_panel), Some(OUTCOME_TIMEOUT))
            .await?;
        match winner {
            RaceWinner::First => Ok(()),
            RaceWinner::Second => {
                let message = self.message_or_unknown(error_message).await?;
                warn!(%message, "ticket ordering rejected");
                Err(TraError::BookingRejected(message))
            }
        }
    }

    async fn required_text(&self, selector: &str, what: &str) -> TraResult<String> {
        match self
            .navigator()
            .element_text(&css(selector), Some(CONFIRM_TIMEOUT))
            .await?
        {
            Some(text) if !text.is_empty() => Ok(text),
            _ => {
                warn!(selector, "{what} not found");
                Err(TraError::MissingElement(what.to_string()))
            }
        }
    }
}
