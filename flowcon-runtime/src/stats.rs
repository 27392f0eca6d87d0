use flowcon_core::ContainerId;
use serde::{Deserialize, Serialize};

/// One row of `docker stats --no-stream` output, timestamped at collection
/// time. Percentage fields are the raw, un-normalized values the runtime
/// reports (`cpu_pct` can exceed 100.0 when a container uses more than one
/// core); normalizing by core count is the algorithm's job, not the
/// runtime's (see `flowcon-algorithm`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSample {
    pub container_id: ContainerId,
    pub time: f64,
    pub cpu_pct: f64,
    pub mem_use: String,
    pub mem_max: String,
    pub mem_pct: f64,
    pub net_in: String,
    pub net_out: String,
    pub block_in: String,
    pub block_out: String,
    pub pids: u32,
}
