//! Contract tests driving a real Chromium binary through `DriverManager`.
//! Ignored by default; they need Chrome/Chromium on the host.

use std::env;
use std::time::Duration;

use cdp_adapter::{AdapterErrorKind, Cdp, CdpConfig, DriverManager, ElementPath, SelectSpec};

fn contract_enabled() -> bool {
    env::var("TRA_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn headless_config() -> CdpConfig {
    CdpConfig {
        headless: true,
        ..CdpConfig::default()
    }
}

const FORM_PAGE: &str = "data:text/html,<html><body>\
<input id='name'>\
<select id='status'><option value='ODS0'>all</option><option value='ODS1'>unpaid</option></select>\
<button id='go' onclick=\"document.title='clicked'\">go</button>\
</body></html>";

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set TRA_CDP_CONTRACT=1"]
async fn contract_form_interaction() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (TRA_CDP_CONTRACT not enabled)");
        return;
    }

    let result = DriverManager::new(headless_config())
        .scoped(|adapter| async move {
            adapter.navigate(FORM_PAGE, Duration::from_secs(15)).await?;

            adapter
                .type_text(&ElementPath::css("#name"), "tra", true, Duration::from_secs(5))
                .await?;
            adapter
                .select_option(
                    SelectSpec::by_value(ElementPath::css("#status"), "ODS1"),
                    Duration::from_secs(5),
                )
                .await?;
            adapter
                .click(&ElementPath::css("#go"), Duration::from_secs(5))
                .await?;

            let name = adapter
                .evaluate_script("document.querySelector('#name').value")
                .await?;
            let status = adapter
                .evaluate_script("document.querySelector('#status').value")
                .await?;
            let title = adapter.evaluate_script("document.title").await?;

            assert_eq!(name.as_str(), Some("tra"));
            assert_eq!(status.as_str(), Some("ODS1"));
            assert_eq!(title.as_str(), Some("clicked"));

            let missing = adapter
                .select_option(
                    SelectSpec::by_value(ElementPath::css("#status"), "ODS9"),
                    Duration::from_secs(2),
                )
                .await
                .expect_err("unknown option");
            assert_eq!(missing.kind, AdapterErrorKind::OptionNotFound);
            Ok::<_, cdp_adapter::AdapterError>(())
        })
        .await;

    result.expect("contract flow");
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set TRA_CDP_CONTRACT=1"]
async fn contract_reports_current_url() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (TRA_CDP_CONTRACT not enabled)");
        return;
    }

    let url = DriverManager::new(headless_config())
        .scoped(|adapter| async move {
            adapter
                .navigate("https://example.com/", Duration::from_secs(20))
                .await?;
            adapter.current_url().await
        })
        .await
        .expect("current url");

    assert!(url.starts_with("https://example.com"));
}
