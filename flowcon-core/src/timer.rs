use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A restartable periodic timer.
///
/// Ticks at a fixed cadence, cancellable idempotently, restartable with a
/// new interval: a `tokio::spawn` loop over `tokio::time::interval` guarded
/// by a `CancellationToken`.
///
/// Starting twice without an intervening `stop` is a no-op: the timer keeps
/// running on whatever token is already live.
pub struct PeriodicTimer {
    token: Mutex<Option<CancellationToken>>,
}

impl Default for PeriodicTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicTimer {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    /// Start ticking at `interval`, invoking `make_tick()` (a fresh future
    /// per tick) every time. No-op if already running.
    pub fn start<F, Fut>(&self, interval: Duration, make_tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.token.lock().unwrap();
        if guard.is_some() {
            debug!("PeriodicTimer::start called while already running; ignoring");
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        *guard = Some(token);
        drop(guard);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so `start` itself
            // doesn't double up with a caller's own seed call.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        make_tick().await;
                    }
                }
            }
        });
    }

    /// Cancel the next firing. Idempotent: calling `stop` when not running,
    /// or calling it twice in a row, is a no-op.
    pub fn stop(&self) {
        if let Some(token) = self.token.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Stop any running loop and start a new one at `new_interval`.
    pub fn restart<F, Fut>(&self, new_interval: Duration, make_tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        self.start(new_interval, make_tick);
    }

    pub fn is_running(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }
}
