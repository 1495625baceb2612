//! Runs against Chromium and the real TRA site.
//!
//! `TRA_LIVE=1 TR_USERNAME=... TR_PASSWORD=... cargo test --test live_site -- --ignored --test-threads=1`

use chrono::{Duration, Local};
use tra_ticket::{
    is_order_code, telemetry, with_browser, AppConfig, BookingRequest, Credentials,
    SeatPreference, TraError,
};

fn live_enabled() -> bool {
    std::env::var("TRA_LIVE").map(|v| v == "1").unwrap_or(false)
}

fn setup() -> Option<(AppConfig, Credentials)> {
    if !live_enabled() {
        eprintln!("skipping: set TRA_LIVE=1 to run live tests");
        return None;
    }
    let Some(creds) = Credentials::from_env() else {
        eprintln!("skipping: TR_USERNAME / TR_PASSWORD not set");
        return None;
    };
    let cfg = AppConfig::load().expect("configuration");
    telemetry::init_logging(&cfg.log_level).expect("logging");
    Some((cfg, creds))
}

#[tokio::test]
#[ignore]
async fn login_and_list_unpaid_orders() {
    let Some((cfg, creds)) = setup() else { return };

    let orders = with_browser(cfg, |mut service| async move {
        assert!(service.login(&creds.username, &creds.password).await);
        assert!(service.session().is_logged_in);
        service.fetch_order_wait_pay().await
    })
    .await
    .expect("unpaid orders");

    assert!(orders.iter().all(|code| is_order_code(code)));
}

#[tokio::test]
#[ignore]
async fn wrong_password_is_rejected() {
    let Some((cfg, creds)) = setup() else { return };

    let logged_in = with_browser(cfg, |mut service| async move {
        let ok = service.login(&creds.username, "definitely-wrong").await;
        assert!(!service.session().is_logged_in);
        Ok::<_, TraError>(ok)
    })
    .await
    .expect("browser session");

    assert!(!logged_in);
}

#[tokio::test]
#[ignore]
async fn cancelling_unknown_order_is_false() {
    let Some((cfg, creds)) = setup() else { return };

    let cancelled = with_browser(cfg, |mut service| async move {
        assert!(service.login(&creds.username, &creds.password).await);
        service.cancel_order_with_ordernum("0000000").await
    })
    .await
    .expect("cancel attempt");

    assert!(!cancelled);
}

#[tokio::test]
#[ignore]
async fn book_then_cancel_round_trip() {
    let Some((cfg, creds)) = setup() else { return };

    let ride_date = Local::now().date_naive() + Duration::days(15);
    let request = BookingRequest::new("1000", "6240", ride_date, 1, "434")
        .with_seat_preference(SeatPreference::Window);

    let (order, cancelled) = with_browser(cfg, |mut service| async move {
        assert!(service.login(&creds.username, &creds.password).await);
        let order = service.order_with_trainnum(&request).await?;
        let results = service
            .cancel_orders_with_ordernum(&[order.ordernum.clone()])
            .await;
        let cancelled = results.get(&order.ordernum).copied().unwrap_or(false);
        Ok::<_, TraError>((order, cancelled))
    })
    .await
    .expect("booking round trip");

    assert!(is_order_code(&order.ordernum));
    assert!(order.carriage.chars().all(|c| c.is_ascii_digit()));
    assert!(order.seat.chars().any(|c| c.is_ascii_digit()));
    assert_eq!(order.trainnum, "434");
    assert!(cancelled);
}
