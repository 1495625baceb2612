mod support;

use action_primitives::ActionError;
use chrono::NaiveDate;
use support::FakeSite;
use tra_ticket::site::{self, login};
use tra_ticket::{BookingRequest, SessionState, TraError, UserInfo};

#[tokio::test]
async fn valid_credentials_log_in() {
    let site = FakeSite::new();
    let mut service = site.service();
    assert_eq!(service.session(), &SessionState::default());

    assert!(service.login("A123456789", "correct-horse").await);

    assert_eq!(
        service.session(),
        &SessionState {
            is_logged_in: true,
            user_info: Some(UserInfo {
                username: "A123456789".into()
            }),
        }
    );
    let log = site.log();
    assert_eq!(log.first().map(String::as_str), Some(format!("go_to:{}", site::LOGIN_URL).as_str()));
    assert!(site.logged(&format!("fill:{}=A123456789", login::USERNAME)));
    assert!(site.logged(&format!("fill:{}=correct-horse", login::PASSWORD)));

    let pause = log.iter().position(|e| e == "pause").unwrap();
    let submit = log
        .iter()
        .position(|e| *e == format!("click:{}", login::SUBMIT))
        .unwrap();
    assert!(pause < submit, "pause happens before submitting");
}

#[tokio::test]
async fn rejected_credentials_keep_session_empty() {
    let site = FakeSite::new();
    let mut service = site.service();

    assert!(!service.login("A123456789", "wrong").await);
    assert!(!service.is_logged_in());
    assert_eq!(service.session().user_info, None);
}

#[tokio::test]
async fn login_timeout_returns_false() {
    let site = FakeSite::new();
    site.configure(|s| s.login_hangs = true);
    let mut service = site.service();

    assert!(!service.login("A123456789", "correct-horse").await);
    assert_eq!(service.session(), &SessionState::default());
}

#[tokio::test]
async fn browser_failures_are_swallowed() {
    let site = FakeSite::new();
    site.configure(|s| s.navigation_error = Some(ActionError::CdpIo("connection reset".into())));
    let mut service = site.service();

    assert!(!service.login("A123456789", "correct-horse").await);
    assert!(!service.is_logged_in());
}

#[tokio::test]
async fn session_operations_require_login() {
    let site = FakeSite::new();
    site.configure(|s| s.unpaid = vec!["1234567".into()]);
    let service = site.service();

    assert!(matches!(
        service.fetch_order_wait_pay().await,
        Err(TraError::NotLoggedIn)
    ));
    assert!(matches!(
        service.cancel_order_with_ordernum("1234567").await,
        Err(TraError::NotLoggedIn)
    ));
    let request = BookingRequest::new(
        "1000",
        "6240",
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
        1,
        "434",
    );
    assert!(matches!(
        service.order_with_trainnum(&request).await,
        Err(TraError::NotLoggedIn)
    ));

    let results = service
        .cancel_orders_with_ordernum(&["1234567", "7654321"])
        .await;
    assert_eq!(results.len(), 2);
    assert!(results.values().all(|cancelled| !cancelled));

    assert!(site.log().iter().all(|e| !e.starts_with("go_to:")));
    assert_eq!(site.unpaid(), vec!["1234567".to_string()]);
}
