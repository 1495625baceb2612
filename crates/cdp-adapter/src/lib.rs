//! Chromium DevTools Protocol adapter for the booking automation.
//!
//! The adapter owns one browser and one attached tab. Higher layers talk to it
//! through the [`Cdp`] trait; element handles are [`ElementPath`]s that get
//! re-resolved from `document` on every command.

use std::{env, path::PathBuf};
use tokio::sync::broadcast;

pub mod ids {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    macro_rules! uuid_id {
        ($($(#[$meta:meta])* $name:ident;)+) => {$(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
            pub struct $name(pub Uuid);

            impl $name {
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }
        )+};
    }

    uuid_id! {
        /// The browser process this adapter drives.
        BrowserId;
        /// The booking tab.
        PageId;
        /// Adapter-side handle for a flattened CDP session.
        SessionId;
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
    pub enum AdapterErrorKind {
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target element not found")]
        TargetNotFound,
        #[error("target element not interactable")]
        NotInteractable,
        #[error("option not found")]
        OptionNotFound,
        #[error("internal error")]
        Internal,
    }

    /// A failed browser command: what kind of failure, plus whatever detail the browser gave.
    #[derive(Clone, Debug, Error, Serialize, Deserialize)]
    #[error("{kind}{}", .hint.as_deref().map(|h| format!(": {h}")).unwrap_or_default())]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(self, hint: impl Into<String>) -> Self {
            Self {
                hint: Some(hint.into()),
                ..self
            }
        }

        pub fn retriable(self, retriable: bool) -> Self {
            Self { retriable, ..self }
        }

        pub fn with_data(self, data: serde_json::Value) -> Self {
            Self {
                data: Some(data),
                ..self
            }
        }
    }

    impl From<AdapterErrorKind> for AdapterError {
        fn from(kind: AdapterErrorKind) -> Self {
            Self::new(kind)
        }
    }
}

pub mod events {
    use super::ids::PageId;
    use serde::{Deserialize, Serialize};

    /// Events published on the adapter bus.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub enum RawEvent {
        PageNavigated {
            page: PageId,
            url: String,
            ts: u64,
        },
        DialogDismissed {
            page: PageId,
            message: String,
        },
        TargetDetached {
            page: PageId,
        },
        Error {
            page: Option<PageId>,
            message: String,
        },
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{fmt, path::PathBuf, str::FromStr, time::Duration};
    use thiserror::Error;

    /// Configuration for launching and driving the browser.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        pub user_data_dir: Option<PathBuf>,
        pub headless: bool,
        pub window_size: WindowSize,
        pub user_agent: Option<String>,
        pub download_dir: Option<PathBuf>,
        pub timeouts: Timeouts,
        pub retry: RetryPolicy,
        pub no_sandbox: bool,
        /// Upper bound for a single CDP round trip.
        pub default_deadline_ms: u64,
        /// Attach to an already running browser instead of launching one.
        pub websocket_url: Option<String>,
        pub heartbeat_interval_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: detect_chrome_executable().unwrap_or_default(),
                user_data_dir: None,
                headless: false,
                window_size: WindowSize::default(),
                user_agent: None,
                download_dir: None,
                timeouts: Timeouts::default(),
                retry: RetryPolicy::default(),
                no_sandbox: true,
                default_deadline_ms: 30_000,
                websocket_url: None,
                heartbeat_interval_ms: 15_000,
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct WindowSize {
        pub width: u32,
        pub height: u32,
    }

    impl Default for WindowSize {
        fn default() -> Self {
            Self {
                width: 1280,
                height: 800,
            }
        }
    }

    #[derive(Debug, Error)]
    #[error("invalid window size '{0}', expected WIDTHxHEIGHT")]
    pub struct WindowSizeParseError(pub String);

    impl FromStr for WindowSize {
        type Err = WindowSizeParseError;

        fn from_str(raw: &str) -> Result<Self, Self::Err> {
            let invalid = || WindowSizeParseError(raw.to_string());
            let (width, height) = raw
                .trim()
                .split_once(|c| c == 'x' || c == 'X')
                .ok_or_else(invalid)?;
            let width: u32 = width.trim().parse().map_err(|_| invalid())?;
            let height: u32 = height.trim().parse().map_err(|_| invalid())?;
            if width == 0 || height == 0 {
                return Err(invalid());
            }
            Ok(Self { width, height })
        }
    }

    impl fmt::Display for WindowSize {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}x{}", self.width, self.height)
        }
    }

    /// Timeouts applied by the navigator, all in milliseconds.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Timeouts {
        pub page_load_ms: u64,
        /// Grace period when looking up elements inside an already present container.
        pub implicit_ms: u64,
        pub script_ms: u64,
        /// Default bound for explicit waits.
        pub wait_ms: u64,
    }

    impl Default for Timeouts {
        fn default() -> Self {
            Self {
                page_load_ms: 30_000,
                implicit_ms: 0,
                script_ms: 30_000,
                wait_ms: 20_000,
            }
        }
    }

    impl Timeouts {
        pub fn page_load(&self) -> Duration {
            Duration::from_millis(self.page_load_ms)
        }

        pub fn implicit(&self) -> Duration {
            Duration::from_millis(self.implicit_ms)
        }

        pub fn script(&self) -> Duration {
            Duration::from_millis(self.script_ms)
        }

        pub fn wait(&self) -> Duration {
            Duration::from_millis(self.wait_ms)
        }
    }

    /// Retry schedule for launching the browser.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct RetryPolicy {
        pub attempts: u32,
        pub initial_delay_ms: u64,
        pub backoff: f64,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            Self {
                attempts: 2,
                initial_delay_ms: 1_000,
                backoff: 1.5,
            }
        }
    }

    impl RetryPolicy {
        /// Delay to sleep after the `attempt`-th failure (1-based).
        pub fn delay_after(&self, attempt: u32) -> Duration {
            let exponent = attempt.saturating_sub(1) as i32;
            let factor = self.backoff.max(1.0).powi(exponent);
            Duration::from_millis((self.initial_delay_ms as f64 * factor).round() as u64)
        }
    }
}

/// Resolve a Chrome/Chromium binary: `TRA_CHROME`, then `PATH`, then the usual install locations.
///
/// Setting `TRA_SKIP_OS_PATHS` disables the last step.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    let from_env = env::var("TRA_CHROME")
        .ok()
        .map(|raw| PathBuf::from(raw.trim()))
        .filter(|path| !path.as_os_str().is_empty() && path.exists());
    if from_env.is_some() {
        return from_env;
    }

    if let Some(found) = CHROME_NAMES.iter().find_map(|name| which::which(name).ok()) {
        return Some(found);
    }

    if env::var_os("TRA_SKIP_OS_PATHS").is_some_and(|v| !v.is_empty()) {
        return None;
    }
    install_locations().into_iter().find(|path| path.exists())
}

#[cfg(target_os = "windows")]
const CHROME_NAMES: &[&str] = &["chrome.exe", "chromium.exe", "msedge.exe"];
#[cfg(not(target_os = "windows"))]
const CHROME_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

#[cfg(target_os = "windows")]
fn install_locations() -> Vec<PathBuf> {
    ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .flat_map(|root| {
            let root = PathBuf::from(root.trim());
            [
                root.join("Google/Chrome/Application/chrome.exe"),
                root.join("Chromium/Application/chrome.exe"),
            ]
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn install_locations() -> Vec<PathBuf> {
    ["Google Chrome.app/Contents/MacOS/Google Chrome", "Chromium.app/Contents/MacOS/Chromium"]
        .into_iter()
        .map(|app| PathBuf::from("/Applications").join(app))
        .collect()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn install_locations() -> Vec<PathBuf> {
    ["google-chrome-stable", "google-chrome", "chromium-browser", "chromium"]
        .into_iter()
        .map(|name| PathBuf::from("/usr/bin").join(name))
        .collect()
}

/// The configured executable when it exists, otherwise whatever detection finds.
pub(crate) fn resolve_chrome_path(cfg: &config::CdpConfig) -> Option<PathBuf> {
    Some(cfg.executable.clone())
        .filter(|path| !path.as_os_str().is_empty() && path.exists())
        .or_else(detect_chrome_executable)
}


pub mod adapter {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use async_trait::async_trait;
    use dashmap::DashMap;
    use serde_json::{json, Value};
    use tokio::select;
    use tokio::sync::{broadcast, Mutex};
    use tokio::task::{spawn, JoinHandle};
    use tokio::time::{sleep, Instant};
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, warn};

    use crate::commands::{ElementPath, SelectSpec};
    use crate::config::CdpConfig;
    use crate::error::{AdapterError, AdapterErrorKind};
    use crate::events::RawEvent;
    use crate::ids::{BrowserId, PageId, SessionId};
    use crate::metrics;
    use crate::registry::Registry;
    use crate::resolve_chrome_path;
    use crate::transport::{
        CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent,
    };

    pub type EventBus = broadcast::Sender<RawEvent>;

    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Capability surface the navigator drives. All commands act on the booking tab.
    #[async_trait]
    pub trait Cdp: Send + Sync {
        /// Load `url` and wait until `document.readyState` is `complete`.
        async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError>;

        async fn current_url(&self) -> Result<String, AdapterError>;

        /// Evaluate an expression and return its JSON value (`null` for undefined).
        async fn evaluate_script(&self, expression: &str) -> Result<Value, AdapterError>;

        /// Scroll the element into view and click its centre.
        async fn click(&self, target: &ElementPath, deadline: Duration)
            -> Result<(), AdapterError>;

        async fn type_text(
            &self,
            target: &ElementPath,
            text: &str,
            clear: bool,
            deadline: Duration,
        ) -> Result<(), AdapterError>;

        async fn select_option(
            &self,
            spec: SelectSpec,
            deadline: Duration,
        ) -> Result<(), AdapterError>;
    }

    pub struct CdpAdapter {
        pub browser_id: BrowserId,
        pub cfg: CdpConfig,
        pub bus: EventBus,
        pub registry: Arc<Registry>,
        shutdown: CancellationToken,
        closing: AtomicBool,
        tasks: Mutex<Vec<JoinHandle<()>>>,
        transport: Arc<dyn CdpTransport>,
        targets: DashMap<String, PageId>,
        primary: OnceLock<PageId>,
    }

    impl CdpAdapter {
        pub fn new(mut cfg: CdpConfig, bus: EventBus) -> Self {
            let transport: Arc<dyn CdpTransport> = if cfg.websocket_url.is_some() {
                info!(target: "cdp-adapter", "attaching to running browser over websocket");
                Arc::new(ChromiumTransport::new(cfg.clone()))
            } else if let Some(path) = resolve_chrome_path(&cfg) {
                cfg.executable = path;
                info!(
                    target: "cdp-adapter",
                    executable = %cfg.executable.display(),
                    "using real Chromium transport"
                );
                Arc::new(ChromiumTransport::new(cfg.clone()))
            } else {
                warn!(
                    target: "cdp-adapter",
                    remediation = "install Chrome/Chromium or set TRA_CHROME=/path/to/chrome",
                    "Chrome executable not found; browser automation is unavailable"
                );
                Arc::new(NoopTransport)
            };
            Self::with_transport(cfg, bus, transport)
        }

        pub fn with_transport(
            cfg: CdpConfig,
            bus: EventBus,
            transport: Arc<dyn CdpTransport>,
        ) -> Self {
            Self {
                browser_id: BrowserId::new(),
                cfg,
                bus,
                registry: Arc::new(Registry::new()),
                shutdown: CancellationToken::new(),
                closing: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
                transport,
                targets: DashMap::new(),
                primary: OnceLock::new(),
            }
        }

        pub fn registry(&self) -> Arc<Registry> {
            Arc::clone(&self.registry)
        }

        pub fn is_shutdown(&self) -> bool {
            self.shutdown.is_cancelled()
        }

        /// Stop the event loop immediately. The browser itself is closed by [`shutdown`](Self::shutdown).
        pub fn abort(&self) {
            self.shutdown.cancel();
        }

        /// The tab every [`Cdp`] command is routed to.
        pub fn primary_page(&self) -> Result<PageId, AdapterError> {
            self.primary.get().copied().ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("booking tab not attached; call start() first")
            })
        }

        pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
            {
                let guard = self.tasks.lock().await;
                if !guard.is_empty() {
                    return Ok(());
                }
            }

            self.transport.start().await?;
            let loop_task = spawn(Self::event_loop(
                Arc::downgrade(&self),
                self.shutdown.clone(),
                Arc::clone(&self.transport),
            ));
            self.tasks.lock().await.push(loop_task);

            if let Err(err) = self.attach().await {
                warn!(target: "cdp-adapter", %err, "failed to attach booking tab");
                self.shutdown().await;
                return Err(err);
            }
            Ok(())
        }

        async fn attach(&self) -> Result<(), AdapterError> {
            let page = self.open_primary_page().await?;
            self.send_page_command(page, "Page.enable", json!({}))
                .await?;
            if let Some(agent) = self.cfg.user_agent.as_deref().filter(|a| !a.trim().is_empty()) {
                self.send_page_command(
                    page,
                    "Network.setUserAgentOverride",
                    json!({ "userAgent": agent }),
                )
                .await?;
            }
            if let Some(dir) = &self.cfg.download_dir {
                let path = absolute_path(dir)?;
                self.send_browser_command(
                    "Browser.setDownloadBehavior",
                    json!({
                        "behavior": "allow",
                        "downloadPath": path.display().to_string(),
                    }),
                )
                .await?;
            }
            info!(
                target: "cdp-adapter",
                browser = ?self.browser_id,
                page = ?page,
                "booking tab attached"
            );
            Ok(())
        }

        async fn open_primary_page(&self) -> Result<PageId, AdapterError> {
            if let Some(page) = self.primary.get() {
                return Ok(*page);
            }

            let created = self
                .send_browser_command("Target.createTarget", json!({ "url": "about:blank" }))
                .await?;
            let target_id = created
                .get("targetId")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint("Target.createTarget returned no targetId")
                })?
                .to_string();

            let attached = self
                .send_browser_command(
                    "Target.attachToTarget",
                    json!({ "targetId": target_id, "flatten": true }),
                )
                .await?;
            let cdp_session = attached
                .get("sessionId")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint("Target.attachToTarget returned no sessionId")
                })?
                .to_string();

            let page = PageId::new();
            self.registry.insert_page(
                page,
                SessionId::new(),
                Some(target_id.clone()),
                Some(cdp_session),
            );
            self.targets.insert(target_id, page);
            let _ = self.primary.set(page);
            Ok(page)
        }

        /// Close the browser (or only our tab when attached over websocket) and stop the event loop.
        pub async fn shutdown(&self) {
            if self.closing.swap(true, Ordering::SeqCst) {
                return;
            }

            if let Ok(page) = self.primary_page() {
                let result = if self.cfg.websocket_url.is_some() {
                    let target = self.registry.get(&page).and_then(|ctx| ctx.target_id);
                    match target {
                        Some(target_id) => self
                            .send_browser_command(
                                "Target.closeTarget",
                                json!({ "targetId": target_id }),
                            )
                            .await
                            .map(|_| ()),
                        None => Ok(()),
                    }
                } else {
                    self.send_browser_command("Browser.close", json!({}))
                        .await
                        .map(|_| ())
                };
                if let Err(err) = result {
                    debug!(target: "cdp-adapter", %err, "browser close command failed");
                }
            }

            self.shutdown.cancel();
            let mut handles = self.tasks.lock().await;
            while let Some(handle) = handles.pop() {
                let _ = handle.await;
            }
            info!(target: "cdp-adapter", browser = ?self.browser_id, "adapter shut down");
        }

        /// Holds only a weak handle so dropping the last adapter releases the transport.
        async fn event_loop(
            adapter: Weak<Self>,
            stop: CancellationToken,
            transport: Arc<dyn CdpTransport>,
        ) {
            debug!(target: "cdp-adapter", "event loop entered");
            loop {
                select! {
                    _ = stop.cancelled() => {
                        break;
                    }
                    event = transport.next_event() => {
                        let Some(adapter) = adapter.upgrade() else { break };
                        match event {
                            Some(ev) => adapter.handle_event(ev).await,
                            None => {
                                if !stop.is_cancelled() {
                                    warn!(target: "cdp-adapter", "transport stream ended");
                                    let _ = adapter.bus.send(RawEvent::Error {
                                        page: adapter.primary.get().copied(),
                                        message: "cdp transport closed".to_string(),
                                    });
                                }
                                break;
                            }
                        }
                    }
                }
            }
            debug!(target: "cdp-adapter", "event loop exiting");
        }

        async fn handle_event(&self, event: TransportEvent) {
            metrics::record_event();
            let page = event
                .session_id
                .as_deref()
                .and_then(|session| self.registry.page_for_session(session));

            match event.method.as_str() {
                "Page.frameNavigated" => {
                    let Some(page) = page else { return };
                    let frame = &event.params["frame"];
                    if frame.get("parentId").is_some() {
                        return;
                    }
                    if let Some(url) = frame.get("url").and_then(Value::as_str) {
                        metrics::record_navigation();
                        debug!(target: "cdp-adapter", page = ?page, url, "main frame navigated");
                        self.registry.set_recent_url(&page, url.to_string());
                        let _ = self.bus.send(RawEvent::PageNavigated {
                            page,
                            url: url.to_string(),
                            ts: timestamp_now(),
                        });
                    }
                }
                "Page.javascriptDialogOpening" => {
                    let Some(page) = page else { return };
                    let message = event.params["message"].as_str().unwrap_or("").to_string();
                    warn!(target: "cdp-adapter", %message, "dismissing javascript dialog");
                    if let Err(err) = self
                        .send_page_command(
                            page,
                            "Page.handleJavaScriptDialog",
                            json!({ "accept": false }),
                        )
                        .await
                    {
                        warn!(target: "cdp-adapter", %err, "failed to dismiss dialog");
                    }
                    let _ = self.bus.send(RawEvent::DialogDismissed { page, message });
                }
                "Target.detachedFromTarget" => {
                    let session = event.params["sessionId"].as_str().unwrap_or_default();
                    if let Some(page) = self.registry.clear_cdp_session(session) {
                        warn!(target: "cdp-adapter", page = ?page, "booking tab detached");
                        let _ = self.bus.send(RawEvent::TargetDetached { page });
                    }
                }
                "Target.targetDestroyed" => {
                    let target = event.params["targetId"].as_str().unwrap_or_default();
                    if let Some((_, page)) = self.targets.remove(target) {
                        self.registry.remove_page(&page);
                        let _ = self.bus.send(RawEvent::TargetDetached { page });
                    }
                }
                other => {
                    debug!(target: "cdp-adapter", method = other, "ignored cdp event");
                }
            }
        }

        async fn send_browser_command(
            &self,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.send_with_metrics(CommandTarget::Browser, method, params)
                .await
        }

        async fn send_page_command(
            &self,
            page: PageId,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            let session = self.registry.get_cdp_session(&page).ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("missing cdp session for page {page:?}"))
            })?;
            self.send_with_metrics(CommandTarget::Session(session), method, params)
                .await
        }

        async fn send_with_metrics(
            &self,
            target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            let start = std::time::Instant::now();
            metrics::record_command(method);
            match self.transport.send_command(target, method, params).await {
                Ok(value) => {
                    metrics::record_command_success(method, start.elapsed());
                    Ok(value)
                }
                Err(err) => {
                    metrics::record_command_failure(method);
                    Err(err)
                }
            }
        }

        async fn evaluate_value(&self, page: PageId, expression: &str) -> Result<Value, AdapterError> {
            let response = self
                .send_page_command(
                    page,
                    "Runtime.evaluate",
                    json!({
                        "expression": expression,
                        "awaitPromise": true,
                        "returnByValue": true,
                        "userGesture": true,
                    }),
                )
                .await?;

            if let Some(details) = response.get("exceptionDetails") {
                return Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("evaluate_script raised exception")
                    .with_data(details.clone()));
            }

            Ok(response
                .get("result")
                .and_then(|res| res.get("value"))
                .cloned()
                .unwrap_or(Value::Null))
        }

        async fn wait_for_document_complete(
            &self,
            page: PageId,
            deadline: Instant,
        ) -> Result<(), AdapterError> {
            loop {
                match self.evaluate_value(page, "document.readyState").await {
                    Ok(Value::String(state)) if state == "complete" => return Ok(()),
                    Ok(_) => {}
                    Err(err) => {
                        debug!(target: "cdp-adapter", %err, "readyState probe failed; retrying");
                    }
                }

                if Instant::now() >= deadline {
                    return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                        .with_hint("page did not finish loading before deadline"));
                }
                sleep(POLL_INTERVAL).await;
            }
        }

        /// Poll `script` (built around the element expression) until it reports `wanted`.
        async fn poll_element_status(
            &self,
            page: PageId,
            target: &ElementPath,
            script: &str,
            wanted: &str,
            deadline: Duration,
        ) -> Result<Value, AdapterError> {
            let deadline_instant = Instant::now() + deadline;
            loop {
                let status = match self.evaluate_value(page, script).await {
                    Ok(value) => {
                        let status = value
                            .get("status")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string();
                        if status == wanted {
                            return Ok(value);
                        }
                        status
                    }
                    Err(err) => {
                        debug!(target: "cdp-adapter", %err, element = %target, "element probe failed");
                        "unavailable".to_string()
                    }
                };

                if Instant::now() >= deadline_instant {
                    let kind = match status.as_str() {
                        "missing" | "unavailable" => AdapterErrorKind::TargetNotFound,
                        _ => AdapterErrorKind::NotInteractable,
                    };
                    return Err(AdapterError::new(kind)
                        .with_hint(format!("element {target} not ready (status: {status})")));
                }
                sleep(POLL_INTERVAL).await;
            }
        }

        async fn dispatch_click(&self, page: PageId, x: f64, y: f64) -> Result<(), AdapterError> {
            for kind in ["mouseMoved", "mousePressed", "mouseReleased"] {
                let (buttons, click_count) = if kind == "mouseMoved" { (0, 0) } else { (1, 1) };
                self.send_page_command(
                    page,
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": if kind == "mouseMoved" { "none" } else { "left" },
                        "buttons": buttons,
                        "clickCount": click_count,
                        "pointerType": "mouse",
                    }),
                )
                .await?;
            }
            Ok(())
        }
    }

    impl Drop for CdpAdapter {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    const CLICK_PROBE: &str = r#"(() => {
    const el = __ELEMENT__;
    if (!el || el === document) { return { status: 'missing' }; }
    if (el.disabled) { return { status: 'disabled' }; }
    if (typeof el.scrollIntoView === 'function') {
        el.scrollIntoView({ block: 'center', inline: 'center' });
    }
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    if (rect.width === 0 || rect.height === 0 || style.visibility === 'hidden' || style.display === 'none') {
        return { status: 'hidden' };
    }
    const x = rect.left + rect.width / 2;
    const y = rect.top + rect.height / 2;
    const hit = document.elementFromPoint(x, y);
    if (hit && hit !== el && !el.contains(hit)) { return { status: 'obscured' }; }
    return { status: 'ok', x, y };
})()"#;

    const FOCUS_PROBE: &str = r#"(() => {
    const el = __ELEMENT__;
    if (!el || el === document) { return { status: 'missing' }; }
    if (el.disabled || el.readOnly) { return { status: 'disabled' }; }
    if (typeof el.focus === 'function') { el.focus(); }
    if (__CLEAR__ && 'value' in el) {
        el.value = '';
        el.dispatchEvent(new Event('input', { bubbles: true }));
    }
    return { status: 'focused' };
})()"#;

    const SELECT_FN: &str = r#"
function(targetValue, matchLabel) {
    if (!this || !this.options) { return { status: 'not-a-select' }; }
    const options = Array.from(this.options);
    let option = options.find(opt => opt.value === targetValue);
    if (!option && matchLabel) {
        option = options.find(opt => opt.text.trim() === targetValue);
    }
    if (!option) { return { status: 'option-missing' }; }
    this.value = option.value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return { status: 'selected', value: this.value };
}
"#;

    #[async_trait]
    impl Cdp for CdpAdapter {
        async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError> {
            let page = self.primary_page()?;
            let deadline_instant = Instant::now() + deadline;
            let response = self
                .send_page_command(page, "Page.navigate", json!({ "url": url }))
                .await?;

            if let Some(error_text) = response
                .get("errorText")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
            {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("navigation to {url} failed: {error_text}"))
                    .retriable(true));
            }

            self.wait_for_document_complete(page, deadline_instant)
                .await
        }

        async fn current_url(&self) -> Result<String, AdapterError> {
            let page = self.primary_page()?;
            let target_id = self
                .registry
                .get(&page)
                .and_then(|ctx| ctx.target_id)
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint("booking tab has no target id")
                })?;

            match self
                .send_browser_command("Target.getTargetInfo", json!({ "targetId": target_id }))
                .await
            {
                Ok(response) => response
                    .get("targetInfo")
                    .and_then(|info| info.get("url"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AdapterError::new(AdapterErrorKind::Internal)
                            .with_hint("Target.getTargetInfo returned no url")
                    }),
                Err(err) => self.registry.recent_url(&page).ok_or(err),
            }
        }

        async fn evaluate_script(&self, expression: &str) -> Result<Value, AdapterError> {
            let page = self.primary_page()?;
            self.evaluate_value(page, expression).await
        }

        async fn click(
            &self,
            target: &ElementPath,
            deadline: Duration,
        ) -> Result<(), AdapterError> {
            let page = self.primary_page()?;
            let script = CLICK_PROBE.replace("__ELEMENT__", &target.resolve_expression());
            let probe = self
                .poll_element_status(page, target, &script, "ok", deadline)
                .await?;
            let x = probe.get("x").and_then(Value::as_f64).unwrap_or_default();
            let y = probe.get("y").and_then(Value::as_f64).unwrap_or_default();
            debug!(target: "cdp-adapter", element = %target, x, y, "dispatching click");
            self.dispatch_click(page, x, y).await
        }

        async fn type_text(
            &self,
            target: &ElementPath,
            text: &str,
            clear: bool,
            deadline: Duration,
        ) -> Result<(), AdapterError> {
            let page = self.primary_page()?;
            let script = FOCUS_PROBE
                .replace("__ELEMENT__", &target.resolve_expression())
                .replace("__CLEAR__", if clear { "true" } else { "false" });
            self.poll_element_status(page, target, &script, "focused", deadline)
                .await?;
            self.send_page_command(page, "Input.insertText", json!({ "text": text }))
                .await?;
            Ok(())
        }

        async fn select_option(
            &self,
            spec: SelectSpec,
            deadline: Duration,
        ) -> Result<(), AdapterError> {
            let page = self.primary_page()?;
            let SelectSpec {
                target,
                value,
                match_label,
            } = spec;

            let expression = target.resolve_expression();
            let deadline_instant = Instant::now() + deadline;
            let object_id = loop {
                let response = self
                    .send_page_command(
                        page,
                        "Runtime.evaluate",
                        json!({
                            "expression": expression,
                            "objectGroup": "tra-select",
                            "returnByValue": false,
                        }),
                    )
                    .await?;

                if let Some(object_id) = response
                    .get("result")
                    .and_then(|res| res.get("objectId"))
                    .and_then(Value::as_str)
                {
                    break object_id.to_string();
                }

                if Instant::now() >= deadline_instant {
                    return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                        .with_hint(format!("select element {target} not found")));
                }
                sleep(POLL_INTERVAL).await;
            };

            let call_response = self
                .send_page_command(
                    page,
                    "Runtime.callFunctionOn",
                    json!({
                        "objectId": object_id,
                        "functionDeclaration": SELECT_FN.trim(),
                        "arguments": [
                            { "value": value },
                            { "value": match_label },
                        ],
                        "awaitPromise": true,
                        "returnByValue": true,
                    }),
                )
                .await;

            let _ = self
                .send_page_command(page, "Runtime.releaseObject", json!({ "objectId": object_id }))
                .await;

            let status = call_response?
                .get("result")
                .and_then(|res| res.get("value"))
                .and_then(|val| val.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();

            match status.as_str() {
                "selected" => Ok(()),
                "option-missing" => Err(AdapterError::new(AdapterErrorKind::OptionNotFound)
                    .with_hint(format!("option '{value}' not found in {target}"))),
                "not-a-select" => Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                    .with_hint(format!("{target} is not a select element"))),
                other => Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("select_option failed: {other}"))),
            }
        }
    }

    fn absolute_path(dir: &std::path::Path) -> Result<PathBuf, AdapterError> {
        if dir.is_absolute() {
            return Ok(dir.to_path_buf());
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("failed to resolve download dir: {err}"))
            })
    }

    fn timestamp_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

}

pub mod commands;
pub mod driver;
pub mod metrics;
pub mod registry;
pub mod transport;

pub use adapter::{Cdp, CdpAdapter, EventBus};
pub use commands::{ElementPath, PathStep, SelectSpec};
pub use config::{CdpConfig, RetryPolicy, Timeouts, WindowSize};
pub use driver::{DriverManager, Launcher};
pub use error::{AdapterError, AdapterErrorKind};
pub use events::RawEvent;
pub use ids::{BrowserId, PageId, SessionId};
pub use metrics::AdapterMetricsSnapshot;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent};

/// Create the broadcast bus the adapter publishes [`RawEvent`]s on.
pub fn event_bus(buffer: usize) -> (EventBus, broadcast::Receiver<RawEvent>) {
    broadcast::channel(buffer)
}
