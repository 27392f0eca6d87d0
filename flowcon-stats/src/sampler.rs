use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flowcon_core::PeriodicTimer;
use flowcon_runtime::{ContainerRuntime, ResourceSample};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;

/// Periodically polls a [`ContainerRuntime`] for resource usage and
/// accumulates the samples into a history any number of readers can snapshot
/// concurrently.
///
/// Takes one synchronous sample at construction time so the history is never
/// empty while the first tick is still pending.
pub struct StatsSampler {
    runtime: Arc<dyn ContainerRuntime>,
    history: Arc<RwLock<Vec<ResourceSample>>>,
    interval: Duration,
    timer: PeriodicTimer,
}

impl StatsSampler {
    pub async fn new(runtime: Arc<dyn ContainerRuntime>, interval: Duration) -> Result<Self> {
        info!(interval_secs = interval.as_secs(), "initializing stats sampler");
        let initial = runtime.stats_all().await?;
        Ok(Self {
            runtime,
            history: Arc::new(RwLock::new(initial)),
            interval,
            timer: PeriodicTimer::new(),
        })
    }

    /// Spawn the periodic task that appends new samples every `interval`.
    pub fn start(&self) {
        let runtime = self.runtime.clone();
        let history = self.history.clone();
        self.timer.start(self.interval, move || {
            let runtime = runtime.clone();
            let history = history.clone();
            async move {
                debug!("polling container stats");
                match runtime.stats_all().await {
                    Ok(mut batch) => {
                        let mut guard = history.write().await;
                        guard.append(&mut batch);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "stats poll failed, skipping this tick");
                    }
                }
            }
        });
    }

    /// A consistent snapshot of everything sampled so far.
    pub async fn history(&self) -> Vec<ResourceSample> {
        self.history.read().await.clone()
    }

    pub fn kill(&self) {
        self.timer.stop();
    }

    /// Write the full history to `path` as CSV.
    pub async fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let history = self.history().await;
        info!(path = %path.as_ref().display(), rows = history.len(), "writing stats history to csv");
        let mut writer = csv::Writer::from_path(path)?;
        for sample in &history {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcon_runtime::FakeRuntime;

    fn sample(id: &str) -> ResourceSample {
        ResourceSample {
            container_id: id.to_string(),
            time: 0.0,
            cpu_pct: 10.0,
            mem_use: "10MiB".into(),
            mem_max: "100MiB".into(),
            mem_pct: 10.0,
            net_in: "0B".into(),
            net_out: "0B".into(),
            block_in: "0B".into(),
            block_out: "0B".into(),
            pids: 1,
        }
    }

    #[tokio::test]
    async fn seeds_history_synchronously_on_construction() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_stats(vec![sample("c1")]);

        let sampler = StatsSampler::new(fake.clone(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(sampler.history().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn appends_on_each_tick() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_stats(vec![sample("c1")]);

        let sampler = StatsSampler::new(fake.clone(), Duration::from_secs(10))
            .await
            .unwrap();
        sampler.start();

        tokio::time::advance(Duration::from_secs(25)).await;
        tokio::task::yield_now().await;

        // one seed sample + two ticks worth of one sample each
        assert_eq!(sampler.history().await.len(), 3);
        sampler.kill();
    }
}
