use crate::error::{Result, RuntimeError};
use crate::runtime::ContainerRuntime;
use crate::stats::ResourceSample;
use async_trait::async_trait;
use flowcon_core::ContainerId;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tracing::{debug, info};

const STATS_FORMAT: &str =
    "{{.ID}}|{{.CPUPerc}}|{{.MemUsage}}|{{.MemPerc}}|{{.NetIO}}|{{.BlockIO}}|{{.PIDs}}";

/// `ContainerRuntime` backed by shelling out to the real `docker` CLI.
pub struct DockerCliRuntime {
    binary: String,
}

impl DockerCliRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Override the binary name/path, e.g. to point at `podman`.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(binary = %self.binary, args = ?args, "running container runtime command");
        let output = Command::new(&self.binary).args(args).output().await?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

impl Default for DockerCliRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn list_ids(&self) -> Result<Vec<ContainerId>> {
        let out = self.run(&["ps", "-q"]).await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    async fn create(&self, image: &str, wd: &str, command: &[String]) -> Result<ContainerId> {
        let mut args: Vec<&str> = vec!["run", "-d", "-w", wd, image];
        for c in command {
            args.push(c);
        }
        let out = self.run(&args).await?;
        let id = out.trim().to_string();
        info!(container_id = %id, %image, "created container");
        Ok(id)
    }

    async fn update_cpu(&self, id: &ContainerId, cpu_limit: f64) -> Result<()> {
        info!(container_id = %id, cpu_limit, "updating container cpu limit");
        self.run(&["update", "--cpus", &cpu_limit.to_string(), id])
            .await?;
        Ok(())
    }

    async fn update_mem(&self, id: &ContainerId, mem_limit_bytes: u64) -> Result<()> {
        info!(container_id = %id, mem_limit_bytes, "updating container memory limit");
        self.run(&["update", "--memory", &mem_limit_bytes.to_string(), id])
            .await?;
        Ok(())
    }

    async fn logs(&self, id: &ContainerId) -> Result<String> {
        self.run(&["logs", id]).await
    }

    async fn stats_all(&self) -> Result<Vec<ResourceSample>> {
        let out = self
            .run(&["stats", "--no-stream", "--format", STATS_FORMAT])
            .await?;
        let now = Self::now();
        let pct_re = Regex::new(r"[%\s]").expect("static regex is valid");

        let mut samples = Vec::new();
        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() != 7 {
                return Err(RuntimeError::Parse(format!(
                    "expected 7 fields in stats line, got {}: {line}",
                    fields.len()
                )));
            }

            let cpu_pct = pct_re
                .replace_all(fields[1], "")
                .parse::<f64>()
                .map_err(|e| RuntimeError::Parse(e.to_string()))?;
            let mem_pct = pct_re
                .replace_all(fields[3], "")
                .parse::<f64>()
                .map_err(|e| RuntimeError::Parse(e.to_string()))?;

            let (mem_use, mem_max) = split_slash_pair(fields[2]);
            let (net_in, net_out) = split_slash_pair(fields[4]);
            let (block_in, block_out) = split_slash_pair(fields[5]);
            let pids = fields[6].trim().parse::<u32>().unwrap_or(0);

            samples.push(ResourceSample {
                container_id: fields[0].trim().to_string(),
                time: now,
                cpu_pct,
                mem_use,
                mem_max,
                mem_pct,
                net_in,
                net_out,
                block_in,
                block_out,
                pids,
            });
        }

        Ok(samples)
    }

    async fn kill(&self, id: &ContainerId) -> Result<()> {
        info!(container_id = %id, "killing container");
        self.run(&["container", "kill", id]).await?;
        Ok(())
    }
}

fn split_slash_pair(s: &str) -> (String, String) {
    let mut parts = s.splitn(2, '/');
    let first = parts.next().unwrap_or_default().trim().to_string();
    let second = parts.next().unwrap_or_default().trim().to_string();
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mem_usage_pair() {
        assert_eq!(
            split_slash_pair("10MiB / 2GiB"),
            ("10MiB".to_string(), "2GiB".to_string())
        );
    }

    #[test]
    fn splits_missing_second_half() {
        assert_eq!(split_slash_pair("5"), ("5".to_string(), String::new()));
    }
}
