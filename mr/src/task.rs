use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum TaskPhase {
    Map,
    Reduce,
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPhase::Map => write!(f, "map"),
            TaskPhase::Reduce => write!(f, "reduce"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TaskState {
    Unassigned,
    Assigned,
    Failed,
    Done,
}

impl TaskState {
    /// Whether a scan may hand this task to a worker.
    pub fn is_assignable(self) -> bool {
        matches!(self, TaskState::Unassigned | TaskState::Failed)
    }
}

/// One unit of map or reduce work tracked by the coordinator.
///
/// A map task holds exactly one source file in `inputs`; a reduce task
/// accumulates the intermediate files of its partition as map tasks finish.
#[derive(Debug, Clone)]
pub struct Task {
    id: usize,
    phase: TaskPhase,
    state: TaskState,
    inputs: Vec<String>,
    attempt: u32,
}

impl Task {
    pub fn new(id: usize, phase: TaskPhase, inputs: Vec<String>) -> Task {
        Task {
            id,
            phase,
            state: TaskState::Unassigned,
            inputs,
            attempt: 0,
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn get_state(&self) -> TaskState {
        self.state
    }

    pub fn get_inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn add_input(&mut self, input: String) {
        self.inputs.push(input);
    }

    /// Number of times this task has been handed out.
    pub fn get_attempt(&self) -> u32 {
        self.attempt
    }

    /// Unassigned/Failed -> Assigned. Returns the new attempt number.
    pub fn assign(&mut self) -> Option<u32> {
        if !self.state.is_assignable() {
            return None;
        }
        self.state = TaskState::Assigned;
        self.attempt += 1;
        Some(self.attempt)
    }

    /// Assigned -> Failed, only for the attempt that is still in flight.
    pub fn fail(&mut self, attempt: u32) -> bool {
        if self.state != TaskState::Assigned || self.attempt != attempt {
            return false;
        }
        self.state = TaskState::Failed;
        true
    }

    /// Assigned/Failed -> Done. A task that was never handed out, or is
    /// already Done, stays as it is.
    pub fn complete(&mut self) -> bool {
        if !matches!(self.state, TaskState::Assigned | TaskState::Failed) {
            return false;
        }
        self.state = TaskState::Done;
        true
    }
}

/// A single record emitted by a map function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> KeyValue {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}
