use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::task::TaskPhase;

/// Completion report for the task a worker was most recently assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub phase: TaskPhase,
    pub task_id: usize,
    /// Intermediate files published by a map task. Empty for reduce.
    pub produced_files: Vec<String>,
}

impl Report {
    pub fn map(task_id: usize, produced_files: Vec<String>) -> Report {
        Report {
            phase: TaskPhase::Map,
            task_id,
            produced_files,
        }
    }

    pub fn reduce(task_id: usize) -> Report {
        Report {
            phase: TaskPhase::Reduce,
            task_id,
            produced_files: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignment {
    Map {
        task_id: usize,
        inputs: Vec<String>,
        reduce_count: usize,
    },
    Reduce {
        task_id: usize,
        inputs: Vec<String>,
    },
    /// Nothing assignable right now, poll again later.
    Wait,
    /// Both phases are complete.
    Quit,
}

#[tarpc::service]
pub trait Rpc {
    async fn request_work(report: Option<Report>) -> Assignment;
    async fn is_job_complete() -> bool;
}

/// Rendezvous socket for the coordinator, unique per user on a host.
pub fn coordinator_sock() -> PathBuf {
    PathBuf::from(format!("/var/tmp/mr-{}", whoami::username()))
}
