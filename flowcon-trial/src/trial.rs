use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flowcon_algorithm::{core_count, ContainerSet, StatusRow};
use flowcon_core::{PeriodicTimer, TrialConfig};
use flowcon_runtime::ContainerRuntime;
use flowcon_stats::StatsSampler;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::error::{Result, TrialError};
use crate::listener::Listener;

const WATCH_LOG_FILE: &str = "watching_completing.csv";

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

/// One row of the accumulated `<name>_algo_1_iters.csv`: a `StatusRow` with
/// the trial-relative `delta_t`/`iter` columns.
#[derive(Debug, Serialize)]
struct IterationRow {
    delta_t: f64,
    iter: u64,
    time: f64,
    age: f64,
    ignore: bool,
    id: String,
    loss: f64,
    progress: Option<f64>,
    growth: Option<f64>,
    limit: Option<f64>,
    limit_norm: Option<f64>,
    watching: bool,
    completing: bool,
}

impl IterationRow {
    fn from_status(row: StatusRow, delta_t: f64, iter: u64) -> Self {
        Self {
            delta_t,
            iter,
            time: row.time,
            age: row.age,
            ignore: row.ignore,
            id: row.id,
            loss: row.loss,
            progress: row.progress,
            growth: row.growth,
            limit: row.limit,
            limit_norm: row.limit_norm,
            watching: row.watching,
            completing: row.completing,
        }
    }
}

struct TrialTiming {
    backoff_interval: Duration,
    iter_num: u64,
    start_time: f64,
    status_rows: Vec<IterationRow>,
}

/// Manages one experimental run: repeatedly runs the control algorithm at a
/// (possibly backed-off) interval, and tears everything down once every
/// container has drained.
pub struct Trial {
    name: String,
    alpha: f64,
    core_count: usize,
    base_interval: Duration,
    no_algo: bool,
    no_update: bool,
    runtime: Arc<dyn ContainerRuntime>,
    sampler: StatsSampler,
    control_timer: PeriodicTimer,
    listener: Listener,
    set: Mutex<ContainerSet>,
    timing: Mutex<TrialTiming>,
    killed: AtomicBool,
    drained: tokio::sync::Notify,
}

impl Trial {
    /// Refuses to start if `<name>_logs.zip` already exists, per the
    /// duplicate-experiment-name guard.
    pub async fn new(config: TrialConfig, runtime: Arc<dyn ContainerRuntime>) -> Result<Arc<Self>> {
        let zip_path = format!("{}_logs.zip", config.experiment_name);
        if Path::new(&zip_path).exists() {
            return Err(TrialError::DuplicateExperiment(config.experiment_name));
        }

        info!(
            name = %config.experiment_name,
            alpha = config.alpha,
            interval = config.interval_secs,
            "creating trial"
        );

        let core_count = core_count();
        let base_interval = Duration::from_secs(config.interval_secs);
        let listener_interval = Duration::from_secs(config.listener_interval_secs);

        let sampler = StatsSampler::new(
            runtime.clone(),
            Duration::from_secs(config.docker_stats_interval_secs),
        )
        .await?;
        sampler.start();

        let set = ContainerSet::new(runtime.clone(), core_count);
        make_watch_log(WATCH_LOG_FILE)?;

        let (drain_tx, mut drain_rx) = mpsc::unbounded_channel::<()>();

        let trial = Arc::new_cyclic(|weak| Trial {
            name: config.experiment_name.clone(),
            alpha: config.alpha,
            core_count,
            base_interval,
            no_algo: config.no_algo,
            no_update: config.no_update,
            runtime: runtime.clone(),
            sampler,
            control_timer: PeriodicTimer::new(),
            listener: Listener::new(weak.clone(), runtime, listener_interval, drain_tx),
            set: Mutex::new(set),
            timing: Mutex::new(TrialTiming {
                backoff_interval: base_interval,
                iter_num: 0,
                start_time: now_secs(),
                status_rows: Vec::new(),
            }),
            killed: AtomicBool::new(false),
            drained: tokio::sync::Notify::new(),
        });

        // The listener's drain signal must never mutate the set itself; it
        // hands off to the one task that owns the receiver and is allowed to.
        let drain_trial = trial.clone();
        tokio::spawn(async move {
            if drain_rx.recv().await.is_some() {
                drain_trial.kill().await;
            }
        });

        let tick_trial = trial.clone();
        trial.control_timer.start(base_interval, move || {
            let trial = tick_trial.clone();
            async move {
                if let Err(err) = trial.run_tick().await {
                    warn!(error = %err, "trial tick failed");
                }
            }
        });

        Ok(trial)
    }

    /// One control-loop tick: reconcile, run the algorithm, maybe back off,
    /// reconcile again, and drain if nothing is left.
    async fn run_tick(self: &Arc<Self>) -> Result<()> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut set = self.set.lock().await;
        set.reconcile(&self.name, self.no_update).await?;

        let mut should_back_off = false;

        if !self.no_algo && !set.is_empty() {
            let rows = flowcon_algorithm::run(
                &mut set,
                &self.sampler,
                self.alpha,
                self.base_interval.as_secs_f64(),
                self.no_update,
                self.core_count,
            )
            .await?;

            should_back_off = set.all_completing();

            let w = set.num_watching();
            let c = set.num_completing();
            let n = set.len();

            let mut timing = self.timing.lock().await;
            let delta_t = now_secs() - timing.start_time;
            let iter = timing.iter_num;
            timing
                .status_rows
                .extend(rows.into_iter().map(|r| IterationRow::from_status(r, delta_t, iter)));
            timing.iter_num += 1;
            append_watch_log(WATCH_LOG_FILE, iter, w, c, n)?;
        }

        if should_back_off {
            drop(set);
            self.backoff().await;
            set = self.set.lock().await;
        }

        set.reconcile(&self.name, self.no_update).await?;
        let drained = set.is_empty();
        drop(set);

        if drained {
            self.kill().await;
        }

        Ok(())
    }

    /// Double the control interval, restart the control timer at the new
    /// cadence, and start the liveness listener.
    pub async fn backoff(self: &Arc<Self>) {
        let mut timing = self.timing.lock().await;
        timing.backoff_interval *= 2;
        let interval = timing.backoff_interval;
        drop(timing);

        info!(interval = interval.as_secs(), "backing off control interval");
        let trial = self.clone();
        self.control_timer.restart(interval, move || {
            let trial = trial.clone();
            async move {
                if let Err(err) = trial.run_tick().await {
                    warn!(error = %err, "trial tick failed");
                }
            }
        });
        self.listener.start().await;
    }

    /// Reset to the base interval and stop the listener.
    pub async fn stop_backoff(self: &Arc<Self>) {
        let mut timing = self.timing.lock().await;
        timing.backoff_interval = self.base_interval;
        drop(timing);

        info!(interval = self.base_interval.as_secs(), "resetting control interval");
        let trial = self.clone();
        self.control_timer.restart(self.base_interval, move || {
            let trial = trial.clone();
            async move {
                if let Err(err) = trial.run_tick().await {
                    warn!(error = %err, "trial tick failed");
                }
            }
        });
        self.listener.stop();
    }

    /// Shut everything down: kill all containers, export CSVs, zip logs,
    /// and cancel both timers. Idempotent. Shutdown order matches the
    /// control timer stopping before the sampler, before the listener.
    pub async fn kill(self: &Arc<Self>) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(name = %self.name, "killing trial");

        self.control_timer.stop();

        {
            let mut set = self.set.lock().await;
            if let Err(err) = set.killall(&self.name).await {
                warn!(error = %err, "error killing containers");
            }
        }

        if let Err(err) = self.export_csvs().await {
            warn!(error = %err, "error exporting csvs");
        }
        if let Err(err) = self.zip_logs() {
            warn!(error = %err, "error zipping logs");
        }

        self.sampler.kill();
        self.listener.stop();
        self.drained.notify_waiters();
    }

    /// Resolve once the trial has fully drained and torn itself down.
    /// The library itself never calls `std::process::exit`; this is how a
    /// binary entry point learns when it's safe to do so.
    pub async fn wait_until_drained(&self) {
        let notified = self.drained.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.killed.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    async fn export_csvs(&self) -> Result<()> {
        if !self.no_algo {
            let timing = self.timing.lock().await;
            let path = format!("{}_algo_1_iters.csv", self.name);
            info!(path, "writing algorithm iteration csv");
            let mut writer = csv::Writer::from_path(&path)?;
            for row in &timing.status_rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        self.sampler
            .to_csv(format!("{}_docker_stats.csv", self.name))
            .await?;
        Ok(())
    }

    /// Move every file starting with the experiment's name prefix into
    /// `<name>_logs.zip`, then delete the loose files.
    fn zip_logs(&self) -> Result<()> {
        info!(name = %self.name, "zipping trial logs");
        let prefix = &self.name;
        let mut matches = Vec::new();
        for entry in std::fs::read_dir(".")? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with(prefix.as_str()) && file_name != format!("{prefix}_logs.zip") {
                matches.push(entry.path());
            }
        }

        let zip_path = format!("{prefix}_logs.zip");
        let file = std::fs::File::create(&zip_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for path in &matches {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                zip.start_file(name, options)?;
                let bytes = std::fs::read(path)?;
                std::io::Write::write_all(&mut zip, &bytes)?;
            }
        }
        zip.finish()?;

        for path in &matches {
            let _ = std::fs::remove_file(path);
        }

        Ok(())
    }
}

fn make_watch_log(path: &str) -> Result<()> {
    std::fs::write(path, "iter, num_watching, num_completing, total\n")?;
    Ok(())
}

fn append_watch_log(path: &str, iter: u64, watching: usize, completing: usize, total: usize) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    writeln!(file, "{iter}, {watching}, {completing}, {total}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcon_runtime::{FakeRuntime, ResourceSample};

    static FS_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Trial writes its CSVs and zip into the process's working directory,
    /// so every filesystem-touching test runs inside its own temp dir with
    /// access to that directory serialized across tests.
    struct Workdir {
        _guard: std::sync::MutexGuard<'static, ()>,
        _tempdir: tempfile::TempDir,
        original: std::path::PathBuf,
    }

    impl Workdir {
        fn new() -> Self {
            let guard = FS_GUARD.lock().unwrap();
            let tempdir = tempfile::tempdir().expect("create tempdir");
            let original = std::env::current_dir().expect("read cwd");
            std::env::set_current_dir(tempdir.path()).expect("enter tempdir");
            Self {
                _guard: guard,
                _tempdir: tempdir,
                original,
            }
        }
    }

    impl Drop for Workdir {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.original);
        }
    }

    fn config(name: &str, alpha: f64, listener_interval_secs: u64) -> TrialConfig {
        TrialConfig {
            experiment_name: name.to_string(),
            interval_secs: 30,
            alpha,
            docker_stats_interval_secs: 30,
            listener_interval_secs,
            no_algo: false,
            no_update: false,
            log_file: None,
            ..TrialConfig::default()
        }
    }

    fn resource_sample(container_id: &str, time: f64, cpu_pct: f64) -> ResourceSample {
        ResourceSample {
            container_id: container_id.to_string(),
            time,
            cpu_pct,
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
    async fn duplicate_experiment_name_is_rejected() {
        let _wd = Workdir::new();
        std::fs::write("dup_test_exp_logs.zip", b"").unwrap();

        let fake = Arc::new(FakeRuntime::default());
        let result = Trial::new(config("dup_test_exp", 0.05, 60), fake).await;

        assert!(matches!(result, Err(TrialError::DuplicateExperiment(_))));
    }

    /// S1: a single container with near-zero loss growth for two consecutive
    /// ticks is classified watching, then completing, and Mode A freezes it
    /// at its fair share.
    #[tokio::test(start_paused = true)]
    async fn watching_then_completing_triggers_drain_mode() {
        let _wd = Workdir::new();
        let now = now_secs();

        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec!["c1".into()]);
        fake.set_stats(vec![resource_sample("c1", now, 100.0)]);
        fake.set_logs(
            "c1",
            format!(
                "Loss: 1.0 Time: {:.3}\nLoss: 0.9999 Time: {:.3}",
                now - 35.0,
                now - 5.0
            ),
        );

        let trial = Trial::new(config("s1_test_exp", 0.05, 60), fake)
            .await
            .unwrap();

        trial.run_tick().await.unwrap();
        {
            let set = trial.set.lock().await;
            let handle = set.iter().next().unwrap();
            assert!(handle.state.is_watching());
            assert!(!handle.frozen);
        }

        trial.run_tick().await.unwrap();
        {
            let set = trial.set.lock().await;
            let handle = set.iter().next().unwrap();
            assert!(handle.state.is_completing());
            assert!(handle.frozen);
            assert_eq!(handle.cpu_limit, Some(core_count() as f64));
        }

        trial.kill().await;
    }

    /// S5: the tracked set empties out partway through a tick (discovered at
    /// reconcile) without a live container ever reaching the algorithm step;
    /// the trial still drains cleanly instead of crashing.
    #[tokio::test(start_paused = true)]
    async fn set_emptying_mid_tick_drains_without_crashing() {
        let _wd = Workdir::new();
        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec!["c1".into()]);
        let trial = Trial::new(config("s5_test_exp", 0.05, 60), fake.clone())
            .await
            .unwrap();

        trial.run_tick().await.unwrap();
        assert!(!trial.killed.load(Ordering::SeqCst));

        fake.set_live_ids(vec![]);
        trial.run_tick().await.unwrap();

        assert!(trial.killed.load(Ordering::SeqCst));
        assert!(std::path::Path::new("s5_test_exp_logs.zip").exists());
    }

    /// S6: a new container appearing during backoff resets the control
    /// interval to base and stops the listener.
    #[tokio::test(start_paused = true)]
    async fn new_container_during_backoff_resets_interval_and_stops_listener() {
        let _wd = Workdir::new();
        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec!["c1".into()]);
        let trial = Trial::new(config("s6_test_exp", 0.05, 1), fake.clone())
            .await
            .unwrap();

        trial.backoff().await;
        {
            let timing = trial.timing.lock().await;
            assert_eq!(timing.backoff_interval, trial.base_interval * 2);
        }
        assert!(trial.listener.is_running());

        fake.set_live_ids(vec!["c1".into(), "new".into()]);
        tokio::time::advance(Duration::from_secs(2)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        {
            let timing = trial.timing.lock().await;
            assert_eq!(timing.backoff_interval, trial.base_interval);
        }
        assert!(!trial.listener.is_running());

        trial.kill().await;
    }
}
