use clap::Args;
use std::{path::PathBuf, time::Duration};

use crate::rpc::coordinator_sock;

/// How long an assigned task may run before it is eligible for reassignment.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a worker sleeps after a Wait assignment.
pub const WAIT_INTERVAL: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_CONNECTIONS: usize = 64;

fn parse_duration(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{s}: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{s}: {e}"))
}

#[derive(Debug, Clone, Args)]
pub struct CoordinatorConfig {
    /// Number of reduce tasks (and output partitions)
    #[arg(long, default_value_t = 10)]
    pub n_reduce: usize,

    /// Seconds before an unreported task is marked failed
    #[arg(long, value_parser = parse_duration, default_value = "10")]
    pub task_timeout: Duration,

    /// Seconds between job completion checks
    #[arg(long, value_parser = parse_duration, default_value = "1")]
    pub poll_interval: Duration,

    /// Coordinator socket, defaults to /var/tmp/mr-<user>
    #[arg(long)]
    pub socket: Option<PathBuf>,

    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    pub max_connections: usize,
}

impl CoordinatorConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(coordinator_sock)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            n_reduce: 10,
            task_timeout: TASK_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            socket: None,
            max_connections: MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct WorkerConfig {
    /// Directory receiving intermediate and output files
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Seconds to sleep when the coordinator has nothing to hand out
    #[arg(long, value_parser = parse_duration, default_value = "5")]
    pub wait_interval: Duration,

    /// Coordinator socket, defaults to /var/tmp/mr-<user>
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

impl WorkerConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(coordinator_sock)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            work_dir: PathBuf::from("."),
            wait_interval: WAIT_INTERVAL,
            socket: None,
        }
    }
}
