//! Websocket link to a Chromium DevTools endpoint.
//!
//! [`ChromiumTransport`] launches Chromium (or attaches to `websocket_url`) on
//! first use and relaunches when the link has died. One background pump owns
//! the websocket: it submits queued commands, routes responses back to their
//! callers and forwards events.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::future::BoxFuture;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::{FutureExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

const LOG_TARGET: &str = "cdp-transport";
/// How long Chromium gets to print its DevTools websocket address.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(20);
const HEARTBEAT_PATIENCE: Duration = Duration::from_secs(5);

/// Raw CDP event as delivered by the websocket connection.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Wire-level seam between the adapter and a DevTools endpoint.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// Transport used when no browser could be found; every command fails.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("no browser available for {method}")))
    }
}

type Connector =
    Arc<dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Arc<BrowserLink>, AdapterError>> + Send + Sync>;

pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<BrowserLink>>>,
    connect: Connector,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        let connect: Connector =
            Arc::new(|cfg: CdpConfig| async move { BrowserLink::open(cfg).await.map(Arc::new) }.boxed());
        Self::with_connector(cfg, connect)
    }

    fn with_connector(cfg: CdpConfig, connect: Connector) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
            connect,
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    /// Current link, reconnecting when there is none or it has died.
    async fn link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        let mut slot = self.link.lock().await;
        match slot.as_ref() {
            Some(link) if link.is_alive() => return Ok(Arc::clone(link)),
            Some(_) => warn!(target: LOG_TARGET, "browser link lost; reconnecting"),
            None => {}
        }
        let link = (self.connect)(self.cfg.clone()).await?;
        *slot = Some(Arc::clone(&link));
        Ok(link)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        self.link()
            .await?
            .call(
                CommandTarget::Browser,
                "Target.setDiscoverTargets",
                json!({ "discover": true }),
                self.deadline(),
            )
            .await
            .map(|_| ())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                warn!(target: LOG_TARGET, %err, "no browser link for events");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.link()
            .await?
            .call(target, method, params, self.deadline())
            .await
    }
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Outgoing {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

/// One live websocket plus the Chromium child that serves it, if we launched it.
struct BrowserLink {
    outgoing: mpsc::Sender<Outgoing>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    tasks: Vec<JoinHandle<()>>,
    child: std::sync::Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl BrowserLink {
    async fn open(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let (child, url) = launch(&cfg).await?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| io_error(err.to_string()))?;

        let (outgoing, queue) = mpsc::channel(128);
        let (events_tx, events) = mpsc::channel(512);
        let alive = Arc::new(AtomicBool::new(true));

        let mut tasks = vec![tokio::spawn(pump(conn, queue, events_tx, Arc::clone(&alive)))];
        if cfg.heartbeat_interval_ms > 0 {
            tasks.push(tokio::spawn(heartbeat(
                outgoing.clone(),
                Arc::clone(&alive),
                Duration::from_millis(cfg.heartbeat_interval_ms),
                Duration::from_millis(cfg.default_deadline_ms).min(HEARTBEAT_PATIENCE),
            )));
        }

        info!(target: LOG_TARGET, url = %ws_url, "connected to chromium");
        Ok(Self {
            outgoing,
            events: Mutex::new(events),
            tasks,
            child: std::sync::Mutex::new(child),
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        self.outgoing
            .send(Outgoing {
                target,
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| io_error("browser link closed"))?;

        match timeout(deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(io_error(format!("no response to {method}"))),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method} timed out after {}ms", deadline.as_millis()))),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    /// Link whose pump is already gone. Commands fail; events end immediately.
    #[cfg(test)]
    fn detached() -> (Self, Arc<AtomicBool>) {
        let (outgoing, _queue) = mpsc::channel(1);
        let (_events_tx, events) = mpsc::channel(1);
        let alive = Arc::new(AtomicBool::new(true));
        let link = Self {
            outgoing,
            events: Mutex::new(events),
            tasks: Vec::new(),
            child: std::sync::Mutex::new(None),
            alive: Arc::clone(&alive),
        };
        (link, alive)
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        for task in &self.tasks {
            task.abort();
        }

        let child = self.child.lock().ok().and_then(|mut slot| slot.take());
        let Some(mut child) = child else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: LOG_TARGET, %err, "failed to kill chromium");
                    }
                });
            }
            Err(_) => debug!(target: LOG_TARGET, "no runtime left to kill chromium"),
        }
    }
}

/// Own the websocket until it fails or closes; then fail every unanswered command.
async fn pump(
    mut conn: Connection<CdpEventMessage>,
    mut queue: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<TransportEvent>,
    alive: Arc<AtomicBool>,
) {
    let mut waiting: HashMap<CallId, Reply> = HashMap::new();

    let failure = loop {
        tokio::select! {
            Some(cmd) = queue.recv() => {
                let session = match cmd.target {
                    CommandTarget::Browser => None,
                    CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                };
                let method: MethodId = cmd.method.into();
                match conn.submit_command(method, session, cmd.params) {
                    Ok(call) => {
                        waiting.insert(call, cmd.reply);
                    }
                    Err(err) => {
                        let _ = cmd.reply.send(Err(io_error(err.to_string())));
                    }
                }
            }
            incoming = conn.next() => match incoming {
                Some(Ok(Message::Response(resp))) => {
                    if let Some(reply) = waiting.remove(&resp.id) {
                        let _ = reply.send(response_payload(resp));
                    }
                }
                Some(Ok(Message::Event(event))) => match decode_event(event) {
                    Ok(event) => {
                        if events.send(event).await.is_err() {
                            debug!(target: LOG_TARGET, "event receiver dropped");
                        }
                    }
                    Err(err) => warn!(target: LOG_TARGET, %err, "undecodable cdp event"),
                },
                Some(Err(err)) => break map_cdp_error(err),
                None => break io_error("cdp connection closed"),
            }
        }
    };

    alive.store(false, Ordering::Relaxed);
    warn!(target: LOG_TARGET, err = %failure, "browser link closed");
    for (_, reply) in waiting.drain() {
        let _ = reply.send(Err(failure.clone()));
    }
}

/// Ping the browser periodically so idle connections are not reaped.
async fn heartbeat(
    outgoing: mpsc::Sender<Outgoing>,
    alive: Arc<AtomicBool>,
    every: Duration,
    patience: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    while alive.load(Ordering::Relaxed) {
        ticker.tick().await;
        let (reply, answer) = oneshot::channel();
        let ping = Outgoing {
            target: CommandTarget::Browser,
            method: "Browser.getVersion".to_string(),
            params: json!({}),
            reply,
        };
        if outgoing.send(ping).await.is_err() {
            break;
        }
        match timeout(patience, answer).await {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(err))) => {
                warn!(target: LOG_TARGET, %err, "heartbeat rejected");
                break;
            }
            Ok(Err(_)) => break,
            Err(_) => {
                warn!(target: LOG_TARGET, "heartbeat unanswered");
                break;
            }
        }
    }
}

fn decode_event(event: CdpEventMessage) -> Result<TransportEvent, AdapterError> {
    let raw: CdpJsonEventMessage = event.try_into().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("cdp event: {err}"))
    })?;
    Ok(TransportEvent {
        method: raw.method.into_owned(),
        params: raw.params,
        session_id: raw.session_id,
    })
}

fn response_payload(resp: Response) -> Result<Value, AdapterError> {
    match (resp.result, resp.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(io_error(format!("cdp error {}: {}", error.code, error.message))
            .retriable(error.code >= 500)),
        (None, None) => Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response")),
    }
}

fn map_cdp_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::NavTimeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::FrameNotFound(_) | CdpError::JavascriptException(_) | CdpError::Serde(_) => {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(hint)
        }
        _ => io_error(hint).retriable(true),
    }
}

fn io_error(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint)
}

async fn launch(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let mut child = browser_config(cfg)?.launch().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("failed to launch chromium: {err}"))
    })?;

    let announced = match timeout(ANNOUNCE_TIMEOUT, devtools_url(&mut child)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("chromium did not announce its devtools url")),
    };
    match announced {
        Ok(url) => Ok((child, url)),
        Err(err) => {
            let _ = child.kill().await;
            Err(io_error(err.to_string()))
        }
    }
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let executable = &cfg.executable;
    if !executable.as_os_str().is_empty() && !executable.exists() {
        return Err(io_error(format!(
            "chrome executable not found at {}",
            executable.display()
        ))
        .with_data(json!({
            "expected": executable,
            "hint": "Set TRA_CHROME to the full path of chrome/chromium."
        })));
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(ANNOUNCE_TIMEOUT)
        .window_size(cfg.window_size.width, cfg.window_size.height)
        .args(launch_args(cfg));
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.no_sandbox();
    }
    if !executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(executable.clone());
    }
    if let Some(dir) = &cfg.user_data_dir {
        builder = builder.user_data_dir(profile_dir(dir)?);
    }

    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("browser config: {err}"))
    })
}

/// Absolute, existing profile directory for `--user-data-dir`.
fn profile_dir(dir: &Path) -> Result<PathBuf, AdapterError> {
    let internal = |what: &str, err: std::io::Error| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("{what}: {err}"))
    };
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| internal("resolve working directory", err))?
            .join(dir)
    };
    fs::create_dir_all(&dir).map_err(|err| internal("create user-data-dir", err))?;
    Ok(dir)
}

/// Command-line switches passed to every launched browser.
pub fn launch_args(cfg: &CdpConfig) -> Vec<String> {
    const BASE: &[&str] = &[
        "--disable-background-networking",
        "--disable-breakpad",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-gpu",
        "--disable-popup-blocking",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
    ];

    let mut args: Vec<String> = BASE.iter().map(|arg| arg.to_string()).collect();
    args.push(format!(
        "--window-size={},{}",
        cfg.window_size.width, cfg.window_size.height
    ));
    if let Some(agent) = cfg.user_agent.as_deref().filter(|a| !a.trim().is_empty()) {
        args.push(format!("--user-agent={agent}"));
    }
    if cfg.headless {
        args.extend(["--headless=new", "--hide-scrollbars", "--mute-audio"].map(String::from));
    }
    args
}

/// Read Chromium's stderr until it prints the DevTools websocket address.
async fn devtools_url(child: &mut Child) -> anyhow::Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium stderr not captured"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut seen = Vec::new();

    while let Some(line) = lines.next().await {
        let line = line?;
        if let Some(url) = parse_devtools_line(&line) {
            return Ok(url);
        }
        if seen.len() < 8 {
            seen.push(line);
        }
    }
    Err(anyhow!(
        "chromium exited before announcing devtools; stderr: {}",
        seen.join(" | ")
    ))
}

fn parse_devtools_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}
