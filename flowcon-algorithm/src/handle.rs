use std::sync::Arc;

use flowcon_runtime::{ContainerRuntime, ResourceSample};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::clock::now_secs;
use crate::error::Result;
use crate::state::ClassificationState;

static LOSS_RE: OnceLock<Regex> = OnceLock::new();
static TIME_RE: OnceLock<Regex> = OnceLock::new();

fn loss_re() -> &'static Regex {
    LOSS_RE.get_or_init(|| Regex::new(r"Loss: ([0-9.]+)").unwrap())
}

fn time_re() -> &'static Regex {
    TIME_RE.get_or_init(|| Regex::new(r"Time: ([0-9.]+)").unwrap())
}

/// One `(time, loss)` pair parsed from a container's stdout log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossSample {
    pub time: f64,
    pub loss: f64,
}

/// A live, tracked container under algorithmic control.
///
/// One job per container, always: `n_jobs` is carried explicitly rather than
/// assumed so that a runtime somehow reporting more than one job packed into
/// a single container id is a loud, caught bug rather than a silently wrong
/// allocation.
pub struct ContainerHandle {
    pub id: String,
    runtime: Arc<dyn ContainerRuntime>,
    pub cpu_limit: Option<f64>,
    pub mem_limit: Option<u64>,
    pub n_jobs: u32,
    pub state: ClassificationState,
    pub frozen: bool,
    pub created_at: f64,
}

impl ContainerHandle {
    pub fn new(id: String, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            id,
            runtime,
            cpu_limit: None,
            mem_limit: None,
            n_jobs: 1,
            state: ClassificationState::Active,
            frozen: false,
            created_at: now_secs(),
        }
    }

    /// Fatal if violated: this system only ever places one job per
    /// container, so `n_jobs` must always read back as 1.
    pub fn check_invariants(&self) -> Result<()> {
        if self.n_jobs != 1 {
            return Err(crate::error::AlgorithmError::InvalidState(format!(
                "container {} has n_jobs = {}, expected 1",
                self.id, self.n_jobs
            )));
        }
        Ok(())
    }

    pub fn age(&self) -> f64 {
        now_secs() - self.created_at
    }

    /// Push a new CPU limit (in core units) through to the runtime and cache
    /// it. The cache is only updated once the runtime confirms the write.
    pub async fn set_cpu_limit(&mut self, limit: f64) -> Result<()> {
        info!(id = %self.id, limit, "setting container cpu limit");
        self.runtime.update_cpu(&self.id, limit).await?;
        self.cpu_limit = Some(limit);
        Ok(())
    }

    pub async fn set_mem_limit(&mut self, limit_bytes: u64) -> Result<()> {
        info!(id = %self.id, limit_bytes, "setting container mem limit");
        self.runtime.update_mem(&self.id, limit_bytes).await?;
        self.mem_limit = Some(limit_bytes);
        Ok(())
    }

    /// Parse the container's full stdout log into `(loss, time)` pairs.
    /// Lines that don't carry both tokens are skipped without error.
    pub async fn loss_table(&self) -> Result<Vec<LossSample>> {
        let logs = self.runtime.logs(&self.id).await?;
        let mut samples = Vec::new();
        for line in logs.lines() {
            let Some(loss_caps) = loss_re().captures(line) else {
                continue;
            };
            let Some(time_caps) = time_re().captures(line) else {
                continue;
            };
            let (Ok(loss), Ok(time)) = (
                loss_caps[1].parse::<f64>(),
                time_caps[1].parse::<f64>(),
            ) else {
                continue;
            };
            samples.push(LossSample { time, loss });
        }
        Ok(samples)
    }

    /// `(E_i, progress)`: loss normalized to its running max, mean
    /// loss over the current window, and the absolute rate of change versus
    /// the previous window. `None` progress means there's no previous window
    /// to compare against yet.
    async fn loss_and_progress(&self, interval: f64) -> Result<(f64, Option<f64>)> {
        let table = self.loss_table().await?;
        let max_loss = table.iter().map(|s| s.loss).fold(f64::MIN, f64::max);

        let now = now_secs();
        let normalized: Vec<LossSample> = table
            .iter()
            .map(|s| LossSample {
                time: s.time,
                loss: s.loss / max_loss,
            })
            .collect();

        let current: Vec<f64> = normalized
            .iter()
            .filter(|s| s.time >= now - interval)
            .map(|s| s.loss)
            .collect();
        let previous: Vec<f64> = normalized
            .iter()
            .filter(|s| s.time >= now - 2.0 * interval && s.time <= now - interval)
            .map(|s| s.loss)
            .collect();

        let e_i = mean(&current);

        if previous.is_empty() {
            return Ok((e_i, None));
        }

        let e_i_minus_1 = mean(&previous);
        let progress = (e_i - e_i_minus_1).abs() / interval;
        Ok((e_i, Some(progress)))
    }

    /// `(loss, progress, growth)`. `growth = None` signals this
    /// container has no measurable progress this round and must be skipped.
    pub async fn growth_tuple(
        &self,
        stats_history: &[ResourceSample],
        interval: f64,
        core_count: usize,
    ) -> Result<(f64, Option<f64>, Option<f64>)> {
        let (e_i, progress) = self.loss_and_progress(interval).await?;
        let Some(progress) = progress else {
            return Ok((e_i, None, None));
        };

        let now = now_secs();
        let cpu_fracs: Vec<f64> = stats_history
            .iter()
            .filter(|s| s.container_id == self.id && s.time >= now - interval)
            .map(|s| s.cpu_pct / core_count as f64 / 100.0)
            .collect();

        if cpu_fracs.is_empty() {
            warn!(id = %self.id, "no resource history in this interval, returning growth of 0");
            return Ok((e_i, None, None));
        }

        let cpu_mean = mean(&cpu_fracs);
        let growth = progress / cpu_mean.max(f64::EPSILON);
        info!(id = %self.id, loss = e_i, progress, growth, "computed growth tuple");
        Ok((e_i, Some(progress), Some(growth)))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcon_runtime::FakeRuntime;

    fn handle(id: &str, runtime: Arc<FakeRuntime>) -> ContainerHandle {
        ContainerHandle::new(id.to_string(), runtime)
    }

    #[tokio::test]
    async fn loss_table_skips_unparseable_lines() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_logs(
            "c1".to_string(),
            "garbage\nLoss: 0.5 Time: 1.0\nLoss: nope Time: 2.0\nLoss: 0.2 Time: 3.0",
        );
        let h = handle("c1", fake);
        let table = h.loss_table().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0], LossSample { time: 1.0, loss: 0.5 });
        assert_eq!(table[1], LossSample { time: 3.0, loss: 0.2 });
    }

    #[tokio::test]
    async fn growth_tuple_is_none_without_previous_window() {
        let fake = Arc::new(FakeRuntime::default());
        let now = now_secs();
        fake.set_logs(
            "c1".to_string(),
            format!("Loss: 0.5 Time: {:.3}", now),
        );
        let h = handle("c1", fake);
        let (_, progress, growth) = h.growth_tuple(&[], 30.0, 4).await.unwrap();
        assert!(progress.is_none());
        assert!(growth.is_none());
    }
}
