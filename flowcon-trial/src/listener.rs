use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use flowcon_core::PeriodicTimer;
use flowcon_runtime::ContainerRuntime;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::trial::Trial;

/// Watches for new containers appearing during backoff. Runs on its own
/// timer, separate from the control loop's, and never touches the
/// container set directly — it only ever calls back into the Trial.
pub struct Listener {
    trial: Weak<Trial>,
    runtime: Arc<dyn ContainerRuntime>,
    interval: Duration,
    timer: Arc<PeriodicTimer>,
    running: Arc<AtomicBool>,
    previous_ids: Arc<Mutex<Vec<String>>>,
    drain_tx: mpsc::UnboundedSender<()>,
}

impl Listener {
    pub fn new(
        trial: Weak<Trial>,
        runtime: Arc<dyn ContainerRuntime>,
        interval: Duration,
        drain_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            trial,
            runtime,
            interval,
            timer: Arc::new(PeriodicTimer::new()),
            running: Arc::new(AtomicBool::new(false)),
            previous_ids: Arc::new(Mutex::new(Vec::new())),
            drain_tx,
        }
    }

    /// Start listening. A no-op if already running.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("listener already running, ignoring start");
            return;
        }
        info!("starting liveness listener");

        let initial = self.runtime.list_ids().await.unwrap_or_default();
        *self.previous_ids.lock().await = initial;

        let runtime = self.runtime.clone();
        let trial = self.trial.clone();
        let drain_tx = self.drain_tx.clone();
        let running = self.running.clone();
        let previous_ids = self.previous_ids.clone();
        let timer = self.timer.clone();

        self.timer.start(self.interval, move || {
            let runtime = runtime.clone();
            let trial = trial.clone();
            let drain_tx = drain_tx.clone();
            let running = running.clone();
            let previous_ids = previous_ids.clone();
            let timer = timer.clone();
            async move {
                let current = match runtime.list_ids().await {
                    Ok(ids) => ids,
                    Err(err) => {
                        warn!(error = %err, "listener failed to list live containers");
                        return;
                    }
                };

                if current.is_empty() {
                    info!("listener observed no live containers, draining trial");
                    running.store(false, Ordering::SeqCst);
                    timer.stop();
                    let _ = drain_tx.send(());
                    return;
                }

                let mut previous = previous_ids.lock().await;
                let has_new = current.iter().any(|id| !previous.contains(id));
                *previous = current;
                drop(previous);

                if has_new {
                    info!("listener observed a new container, resetting backoff");
                    if let Some(trial) = trial.upgrade() {
                        trial.stop_backoff().await;
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        self.timer.stop();
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcon_runtime::FakeRuntime;

    #[tokio::test(start_paused = true)]
    async fn sends_drain_signal_when_no_live_containers() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Listener::new(Weak::new(), fake, Duration::from_secs(1), tx);

        listener.start().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert!(rx.try_recv().is_ok());
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn start_is_a_noop_when_already_running() {
        let fake = Arc::new(FakeRuntime::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let listener = Listener::new(Weak::new(), fake, Duration::from_secs(60), tx);

        listener.start().await;
        assert!(listener.is_running());
        listener.start().await;
        assert!(listener.is_running());

        listener.stop();
    }
}
