use crate::error::Result;
use crate::runtime::ContainerRuntime;
use crate::stats::ResourceSample;
use async_trait::async_trait;
use flowcon_core::ContainerId;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory `ContainerRuntime` double used across this workspace's test
/// suites in place of a real Docker daemon. Canned logs/stats/live-ids are
/// seeded by the test and can be mutated mid-test to simulate containers
/// appearing, dying, or emitting new log lines.
#[derive(Default)]
pub struct FakeRuntime {
    live_ids: Mutex<Vec<ContainerId>>,
    logs: Mutex<HashMap<ContainerId, String>>,
    stats: Mutex<Vec<ResourceSample>>,
    cpu_limits: Mutex<HashMap<ContainerId, f64>>,
    killed: Mutex<Vec<ContainerId>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_live_ids(&self, ids: Vec<ContainerId>) {
        *self.live_ids.lock().unwrap() = ids;
    }

    pub fn set_logs(&self, id: impl Into<ContainerId>, log: impl Into<String>) {
        self.logs.lock().unwrap().insert(id.into(), log.into());
    }

    pub fn append_log_line(&self, id: &ContainerId, line: &str) {
        let mut logs = self.logs.lock().unwrap();
        let entry = logs.entry(id.clone()).or_default();
        if !entry.is_empty() {
            entry.push('\n');
        }
        entry.push_str(line);
    }

    pub fn set_stats(&self, samples: Vec<ResourceSample>) {
        *self.stats.lock().unwrap() = samples;
    }

    pub fn cpu_limit(&self, id: &ContainerId) -> Option<f64> {
        self.cpu_limits.lock().unwrap().get(id).copied()
    }

    pub fn killed_ids(&self) -> Vec<ContainerId> {
        self.killed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_ids(&self) -> Result<Vec<ContainerId>> {
        Ok(self.live_ids.lock().unwrap().clone())
    }

    async fn create(&self, _image: &str, _wd: &str, _command: &[String]) -> Result<ContainerId> {
        let id = format!("fake-{}", self.live_ids.lock().unwrap().len());
        self.live_ids.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn update_cpu(&self, id: &ContainerId, cpu_limit: f64) -> Result<()> {
        self.cpu_limits.lock().unwrap().insert(id.clone(), cpu_limit);
        Ok(())
    }

    async fn update_mem(&self, _id: &ContainerId, _mem_limit_bytes: u64) -> Result<()> {
        Ok(())
    }

    async fn logs(&self, id: &ContainerId) -> Result<String> {
        // A live container with no seeded log lines yet behaves like a real
        // `docker logs` on a container that hasn't printed anything: empty
        // stdout, not an error.
        Ok(self.logs.lock().unwrap().get(id).cloned().unwrap_or_default())
    }

    async fn stats_all(&self) -> Result<Vec<ResourceSample>> {
        Ok(self.stats.lock().unwrap().clone())
    }

    async fn kill(&self, id: &ContainerId) -> Result<()> {
        self.killed.lock().unwrap().push(id.clone());
        Ok(())
    }
}
