//! Browser lifecycle: launch with retry, explicit quit, scoped acquisition.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::adapter::CdpAdapter;
use crate::config::CdpConfig;
use crate::error::AdapterError;

/// Produces a started adapter for a configuration.
pub type Launcher = Arc<
    dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Arc<CdpAdapter>, AdapterError>> + Send + Sync,
>;

pub struct DriverManager {
    cfg: CdpConfig,
    launcher: Launcher,
    adapter: Option<Arc<CdpAdapter>>,
}

impl DriverManager {
    pub fn new(cfg: CdpConfig) -> Self {
        let launcher: Launcher = Arc::new(|cfg: CdpConfig| launch_chromium(cfg).boxed());
        Self::with_launcher(cfg, launcher)
    }

    pub fn with_launcher(cfg: CdpConfig, launcher: Launcher) -> Self {
        Self {
            cfg,
            launcher,
            adapter: None,
        }
    }

    pub fn config(&self) -> &CdpConfig {
        &self.cfg
    }

    /// The running adapter, if `start` succeeded and `quit` has not been called.
    pub fn adapter(&self) -> Option<Arc<CdpAdapter>> {
        self.adapter.clone()
    }

    /// Launch the browser, retrying per `cfg.retry`. Returns the running adapter when already started.
    pub async fn start(&mut self) -> Result<Arc<CdpAdapter>, AdapterError> {
        if let Some(adapter) = &self.adapter {
            return Ok(Arc::clone(adapter));
        }

        let policy = self.cfg.retry.clone();
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(
                target: "driver",
                attempt,
                attempts,
                headless = self.cfg.headless,
                window = %self.cfg.window_size,
                "starting browser"
            );
            match (self.launcher)(self.cfg.clone()).await {
                Ok(adapter) => {
                    info!(target: "driver", browser = ?adapter.browser_id, "browser started");
                    self.adapter = Some(Arc::clone(&adapter));
                    return Ok(adapter);
                }
                Err(err) if attempt < attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        target: "driver",
                        attempt,
                        %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "browser start failed"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(target: "driver", attempt, %err, "giving up on browser start");
                    return Err(err);
                }
            }
        }
    }

    /// Close the browser. No-op when nothing is running.
    pub async fn quit(&mut self) {
        if let Some(adapter) = self.adapter.take() {
            info!(target: "driver", browser = ?adapter.browser_id, "quitting browser");
            adapter.shutdown().await;
        }
    }

    /// Run `work` against a started browser and quit afterwards, whatever the outcome.
    ///
    /// The browser is also closed when the returned future is dropped early or `work` panics.
    pub async fn scoped<F, Fut, T, E>(mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(Arc<CdpAdapter>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AdapterError>,
    {
        let adapter = self.start().await?;
        let mut guard = QuitOnDrop(Some(Arc::clone(&adapter)));
        let result = work(adapter).await;
        self.quit().await;
        guard.disarm();
        result
    }
}

/// Closes the browser from `Drop` when a scope is abandoned before its normal quit.
struct QuitOnDrop(Option<Arc<CdpAdapter>>);

impl QuitOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for QuitOnDrop {
    fn drop(&mut self) {
        let Some(adapter) = self.0.take() else { return };
        warn!(target: "driver", browser = ?adapter.browser_id, "scope abandoned; closing browser");
        adapter.abort();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { adapter.shutdown().await });
            }
            Err(_) => warn!(target: "driver", "no runtime left to close the browser"),
        }
    }
}

async fn launch_chromium(cfg: CdpConfig) -> Result<Arc<CdpAdapter>, AdapterError> {
    let (bus, _rx) = crate::event_bus(64);
    let adapter = Arc::new(CdpAdapter::new(cfg, bus));
    Arc::clone(&adapter).start().await?;
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::AdapterErrorKind;
    use crate::transport::{CdpTransport, NoopTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fast_config(attempts: u32) -> CdpConfig {
        CdpConfig {
            retry: RetryPolicy {
                attempts,
                initial_delay_ms: 10,
                backoff: 1.5,
            },
            ..CdpConfig::default()
        }
    }

    fn idle_adapter(cfg: CdpConfig) -> Arc<CdpAdapter> {
        let (bus, _rx) = crate::event_bus(4);
        Arc::new(CdpAdapter::with_transport(
            cfg,
            bus,
            Arc::new(NoopTransport) as Arc<dyn CdpTransport>,
        ))
    }

    /// Fails the first `failures` launches, then hands out idle adapters.
    fn scripted_launcher(
        failures: usize,
        calls: Arc<AtomicUsize>,
        launched: Arc<Mutex<Vec<Arc<CdpAdapter>>>>,
    ) -> Launcher {
        Arc::new(move |cfg: CdpConfig| {
            let calls = Arc::clone(&calls);
            let launched = Arc::clone(&launched);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint("chromium exited early"));
                }
                let adapter = idle_adapter(cfg);
                launched.lock().unwrap().push(Arc::clone(&adapter));
                Ok(adapter)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let launched = Arc::new(Mutex::new(Vec::new()));
        let mut manager = DriverManager::with_launcher(
            fast_config(2),
            scripted_launcher(1, Arc::clone(&calls), Arc::clone(&launched)),
        );

        let adapter = manager.start().await.expect("second attempt succeeds");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let again = manager.start().await.expect("already running");
        assert!(Arc::ptr_eq(&adapter, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        manager.quit().await;
        assert!(manager.adapter().is_none());
        assert!(adapter.is_shutdown());
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let launched = Arc::new(Mutex::new(Vec::new()));
        let mut manager = DriverManager::with_launcher(
            fast_config(3),
            scripted_launcher(usize::MAX, Arc::clone(&calls), launched),
        );

        let Err(err) = manager.start().await else {
            panic!("all attempts fail");
        };
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(manager.adapter().is_none());
    }

    #[tokio::test]
    async fn scoped_quits_even_when_work_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let launched = Arc::new(Mutex::new(Vec::new()));
        let manager = DriverManager::with_launcher(
            fast_config(1),
            scripted_launcher(0, calls, Arc::clone(&launched)),
        );

        let result: Result<(), AdapterError> = manager
            .scoped(|_adapter| async {
                Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("workflow failed"))
            })
            .await;

        assert!(result.is_err());
        let launched = launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert!(launched[0].is_shutdown());
    }

    #[tokio::test]
    async fn abandoned_scope_still_closes_browser() {
        let launched = Arc::new(Mutex::new(Vec::new()));
        let manager = DriverManager::with_launcher(
            fast_config(1),
            scripted_launcher(0, Arc::new(AtomicUsize::new(0)), Arc::clone(&launched)),
        );

        let scope = manager.scoped(|_adapter| std::future::pending::<Result<(), AdapterError>>());
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(50), scope).await;
        assert!(outcome.is_err());

        let adapter = Arc::clone(&launched.lock().unwrap()[0]);
        assert!(adapter.is_shutdown());
    }

    #[tokio::test]
    async fn panicking_work_still_closes_browser() {
        let launched = Arc::new(Mutex::new(Vec::new()));
        let manager = DriverManager::with_launcher(
            fast_config(1),
            scripted_launcher(0, Arc::new(AtomicUsize::new(0)), Arc::clone(&launched)),
        );

        fn explode() -> Result<(), AdapterError> {
            panic!("workflow blew up")
        }

        let task = tokio::spawn(manager.scoped(|_adapter| async { explode() }));
        assert!(task.await.unwrap_err().is_panic());

        let adapter = Arc::clone(&launched.lock().unwrap()[0]);
        assert!(adapter.is_shutdown());
    }

    #[tokio::test]
    async fn quit_without_start_is_a_no_op() {
        let mut manager = DriverManager::with_launcher(
            fast_config(1),
            scripted_launcher(0, Arc::new(AtomicUsize::new(0)), Arc::new(Mutex::new(Vec::new()))),
        );
        manager.quit().await;
        assert!(manager.adapter().is_none());
    }
}
