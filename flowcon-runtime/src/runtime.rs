use crate::error::Result;
use crate::stats::ResourceSample;
use async_trait::async_trait;
use flowcon_core::ContainerId;

/// The only non-self-managed dependency of the control loop: everything it
/// needs from the container runtime, narrowed to the seven operations the
/// control loop actually calls. Kept deliberately thin and blocking-shaped
/// (every method maps to one subprocess/RPC call) since that is the
/// dominant source of latency in a tick (see the concurrency model notes).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ids of all currently live containers (`docker ps -q`).
    async fn list_ids(&self) -> Result<Vec<ContainerId>>;

    /// Launch a container from `image` with working directory `wd` running
    /// `command`, returning its id.
    async fn create(&self, image: &str, wd: &str, command: &[String]) -> Result<ContainerId>;

    /// Update a container's CPU quota to a fractional core count
    /// (`docker update --cpus <limit> <id>`).
    async fn update_cpu(&self, id: &ContainerId, cpu_limit: f64) -> Result<()>;

    /// Update a container's memory limit in bytes
    /// (`docker update --memory <limit> <id>`).
    async fn update_mem(&self, id: &ContainerId, mem_limit_bytes: u64) -> Result<()>;

    /// Full stdout log of a container (`docker logs <id>`).
    async fn logs(&self, id: &ContainerId) -> Result<String>;

    /// One `docker stats --no-stream` snapshot for every live container.
    async fn stats_all(&self) -> Result<Vec<ResourceSample>>;

    /// Kill a container by id (`docker container kill <id>`).
    async fn kill(&self, id: &ContainerId) -> Result<()>;
}
