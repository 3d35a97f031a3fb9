use futures::{future, lock::Mutex, prelude::*};
use std::{path::Path, sync::Arc, time::Duration};
use tarpc::{
    context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{MrError, MrResult};
use crate::partition::parse_intermediate;
use crate::rpc::{Assignment, Report};
use crate::task::{Task, TaskPhase, TaskState};

/// Identifies one handed-out attempt of a task, so its failure timer can
/// find it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub phase: TaskPhase,
    pub task_id: usize,
    pub attempt: u32,
}

/// What became of a completion report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// The task is now Done. Files without an in-range partition were
    /// left out of the intermediate index.
    Accepted { ignored_files: Vec<String> },
    AlreadyDone,
    /// The task was never handed out.
    NotAssigned,
    UnknownTask,
}

/// The task ledger. All methods are synchronous and are called with the
/// scheduler lock held; they never log, the scheduler does once the lock
/// is released.
#[derive(Debug)]
pub struct Coordinator {
    n_reduce: usize,
    map_tasks: Vec<Task>,    // one per input file, id = file index
    reduce_tasks: Vec<Task>, // inputs are the intermediate files of that partition
}

impl Coordinator {
    pub fn new(files: Vec<String>, n_reduce: usize) -> MrResult<Self> {
        if n_reduce == 0 {
            return Err(MrError::InvalidJob("reduce count must be at least 1".into()));
        }
        let map_tasks = files
            .into_iter()
            .enumerate()
            .map(|(i, file)| Task::new(i, TaskPhase::Map, vec![file]))
            .collect();
        let reduce_tasks = (0..n_reduce)
            .map(|i| Task::new(i, TaskPhase::Reduce, vec![]))
            .collect();
        Ok(Coordinator {
            n_reduce,
            map_tasks,
            reduce_tasks,
        })
    }

    fn tasks(&self, phase: TaskPhase) -> &[Task] {
        match phase {
            TaskPhase::Map => &self.map_tasks,
            TaskPhase::Reduce => &self.reduce_tasks,
        }
    }

    fn tasks_mut(&mut self, phase: TaskPhase) -> &mut [Task] {
        match phase {
            TaskPhase::Map => &mut self.map_tasks,
            TaskPhase::Reduce => &mut self.reduce_tasks,
        }
    }

    pub fn task(&self, phase: TaskPhase, id: usize) -> Option<&Task> {
        self.tasks(phase).get(id)
    }

    /// Intermediate files recorded so far for partition `r`.
    pub fn intermediate_files(&self, r: usize) -> &[String] {
        self.reduce_tasks
            .get(r)
            .map(|task| task.get_inputs())
            .unwrap_or_default()
    }

    fn phase_complete(&self, phase: TaskPhase) -> bool {
        self.tasks(phase)
            .iter()
            .all(|task| task.get_state() == TaskState::Done)
    }

    pub fn map_phase_complete(&self) -> bool {
        self.phase_complete(TaskPhase::Map)
    }

    pub fn reduce_phase_complete(&self) -> bool {
        self.phase_complete(TaskPhase::Reduce)
    }

    pub fn is_done(&self) -> bool {
        self.map_phase_complete() && self.reduce_phase_complete()
    }

    /// Marks the reported task Done. Only a task that was handed out and
    /// is not yet Done accepts a report; anything else leaves the ledger,
    /// including the intermediate index, untouched.
    pub fn record(&mut self, report: Report) -> Recorded {
        let n_reduce = self.n_reduce;
        let Some(task) = self.tasks_mut(report.phase).get_mut(report.task_id) else {
            return Recorded::UnknownTask;
        };
        match task.get_state() {
            TaskState::Done => return Recorded::AlreadyDone,
            TaskState::Unassigned => return Recorded::NotAssigned,
            TaskState::Assigned | TaskState::Failed => {}
        }
        task.complete();

        let mut ignored_files = vec![];
        if report.phase == TaskPhase::Map {
            for file in report.produced_files {
                match parse_intermediate(&file) {
                    Some((_, r)) if r < n_reduce => self.reduce_tasks[r].add_input(file),
                    _ => ignored_files.push(file),
                }
            }
        }
        Recorded::Accepted { ignored_files }
    }

    /// Hands out the lowest-numbered assignable task of the current phase.
    /// Returns the armed attempt alongside the assignment so the caller can
    /// start its failure timer.
    pub fn assign(&mut self) -> (Assignment, Option<Attempt>) {
        let phase = if !self.map_phase_complete() {
            TaskPhase::Map
        } else if !self.reduce_phase_complete() {
            TaskPhase::Reduce
        } else {
            return (Assignment::Quit, None);
        };

        let n_reduce = self.n_reduce;
        let Some(task) = self
            .tasks_mut(phase)
            .iter_mut()
            .find(|task| task.get_state().is_assignable())
        else {
            // everything left in this phase is in flight
            return (Assignment::Wait, None);
        };
        let Some(attempt) = task.assign() else {
            return (Assignment::Wait, None);
        };

        let task_id = task.get_id();
        let inputs = task.get_inputs().to_vec();
        let assignment = match task.get_phase() {
            TaskPhase::Map => Assignment::Map {
                task_id,
                inputs,
                reduce_count: n_reduce,
            },
            TaskPhase::Reduce => Assignment::Reduce { task_id, inputs },
        };
        (
            assignment,
            Some(Attempt {
                phase,
                task_id,
                attempt,
            }),
        )
    }

    /// Failure timer callback. Returns true if the attempt was still in
    /// flight and is now Failed.
    pub fn expire(&mut self, attempt: Attempt) -> bool {
        self.tasks_mut(attempt.phase)
            .get_mut(attempt.task_id)
            .is_some_and(|task| task.fail(attempt.attempt))
    }
}

/// Shared handle to the ledger. Every read or write of task state,
/// including timer callbacks, goes through the one lock.
#[derive(Clone)]
pub struct Scheduler {
    coordinator: Arc<Mutex<Coordinator>>,
    task_timeout: Duration,
}

impl Scheduler {
    pub fn new(coordinator: Coordinator, task_timeout: Duration) -> Self {
        Scheduler {
            coordinator: Arc::new(Mutex::new(coordinator)),
            task_timeout,
        }
    }

    pub async fn request_work(&self, report: Option<Report>) -> Assignment {
        let reported = report.as_ref().map(|r| (r.phase, r.task_id));
        let (recorded, assignment, attempt) = {
            let mut coordinator = self.coordinator.lock().await;
            let recorded = report.map(|report| coordinator.record(report));
            let (assignment, attempt) = coordinator.assign();
            (recorded, assignment, attempt)
        };

        if let (Some((phase, task_id)), Some(recorded)) = (reported, recorded) {
            match recorded {
                Recorded::Accepted { ignored_files } => {
                    info!("{} task {} done", phase, task_id);
                    for file in ignored_files {
                        warn!("ignoring intermediate file {:?} from map task {}", file, task_id);
                    }
                }
                Recorded::AlreadyDone => {
                    debug!("{} task {} already done, ignoring report", phase, task_id)
                }
                Recorded::NotAssigned => {
                    warn!("{} task {} was never assigned, ignoring report", phase, task_id)
                }
                Recorded::UnknownTask => warn!("report for unknown {} task {}", phase, task_id),
            }
        }
        if let Some(attempt) = attempt {
            debug!(
                "assigned {} task {} (attempt {})",
                attempt.phase, attempt.task_id, attempt.attempt
            );
            self.arm_timer(attempt);
        }
        assignment
    }

    fn arm_timer(&self, attempt: Attempt) {
        let coordinator = Arc::clone(&self.coordinator);
        let timeout = self.task_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            let failed = coordinator.lock().await.expire(attempt);
            if failed {
                warn!(
                    "{} task {} timed out on attempt {}, marking failed",
                    attempt.phase, attempt.task_id, attempt.attempt
                );
            }
        });
    }

    pub async fn is_job_complete(&self) -> bool {
        self.coordinator.lock().await.reduce_phase_complete()
    }

    /// Runs `f` against the ledger under the lock.
    pub async fn inspect<T>(&self, f: impl FnOnce(&Coordinator) -> T) -> T {
        f(&*self.coordinator.lock().await)
    }
}

#[derive(Clone)]
pub struct CoordinatorServer {
    scheduler: Scheduler,
}

impl crate::rpc::Rpc for CoordinatorServer {
    async fn request_work(self, _: context::Context, report: Option<Report>) -> Assignment {
        self.scheduler.request_work(report).await
    }

    async fn is_job_complete(self, _: context::Context) -> bool {
        self.scheduler.is_job_complete().await
    }
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

/// Serves the scheduler on a UNIX socket until every reduce task is done.
pub async fn serve(scheduler: Scheduler, config: &CoordinatorConfig) -> anyhow::Result<()> {
    let socket = config.socket_path();
    remove_socket(&socket)?;

    let listener = tarpc::serde_transport::unix::listen(&socket, Json::default).await?;
    info!("listening on {}", socket.display());

    let server = CoordinatorServer {
        scheduler: scheduler.clone(),
    };
    let server_future = listener
        // Ignore accept errors.
        .filter_map(|r| future::ready(r.ok()))
        .map(server::BaseChannel::with_defaults)
        .map(move |channel| {
            channel
                .execute(crate::rpc::Rpc::serve(server.clone()))
                .for_each(spawn)
        })
        .buffer_unordered(config.max_connections)
        .for_each(|_| async {});

    let job_done = async {
        while !scheduler.is_job_complete().await {
            sleep(config.poll_interval).await;
        }
    };

    tokio::select! {
        _ = server_future => {},
        _ = job_done => info!("all tasks completed"),
    }

    remove_socket(&socket)?;
    Ok(())
}

/// Entry point for the coordinator process.
#[tokio::main]
pub async fn run(files: Vec<String>, config: CoordinatorConfig) -> anyhow::Result<()> {
    let coordinator = Coordinator::new(files, config.n_reduce)?;
    let scheduler = Scheduler::new(coordinator, config.task_timeout);
    serve(scheduler, &config).await
}

fn remove_socket(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(MrError::io(path, e).into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("pg-{}.txt", i)).collect()
    }

    fn map_task_id(assignment: &Assignment) -> usize {
        match assignment {
            Assignment::Map { task_id, .. } => *task_id,
            other => panic!("expected map assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_coordinator_new() {
        let coordinator = Coordinator::new(files(3), 2).unwrap();

        assert_eq!(coordinator.map_tasks.len(), 3);
        assert_eq!(coordinator.reduce_tasks.len(), 2);
        for (i, task) in coordinator.map_tasks.iter().enumerate() {
            assert_eq!(task.get_id(), i);
            assert_eq!(task.get_inputs(), &[format!("pg-{}.txt", i)]);
            assert_eq!(task.get_state(), TaskState::Unassigned);
        }
        assert!(!coordinator.map_phase_complete());
    }

    #[test]
    fn test_coordinator_rejects_zero_reduce() {
        assert!(matches!(
            Coordinator::new(files(1), 0),
            Err(MrError::InvalidJob(_))
        ));
    }

    #[test]
    fn test_map_tasks_assigned_in_order() {
        let mut coordinator = Coordinator::new(files(2), 1).unwrap();

        let (first, attempt) = coordinator.assign();
        assert_eq!(
            first,
            Assignment::Map {
                task_id: 0,
                inputs: vec!["pg-0.txt".to_string()],
                reduce_count: 1,
            }
        );
        assert_eq!(
            attempt,
            Some(Attempt {
                phase: TaskPhase::Map,
                task_id: 0,
                attempt: 1,
            })
        );
        let (second, _) = coordinator.assign();
        assert_eq!(map_task_id(&second), 1);
    }

    #[test]
    fn test_wait_while_maps_in_flight() {
        let mut coordinator = Coordinator::new(files(2), 3).unwrap();
        coordinator.assign();
        coordinator.assign();

        let (assignment, attempt) = coordinator.assign();
        assert_eq!(assignment, Assignment::Wait);
        assert!(attempt.is_none());

        // one map done, one still running: reduce must not start yet
        coordinator.record(Report::map(0, vec!["mr-temp-0-1".to_string()]));
        assert_eq!(coordinator.assign().0, Assignment::Wait);
        assert_eq!(coordinator.task(TaskPhase::Reduce, 1).unwrap().get_state(), TaskState::Unassigned);
    }

    #[test]
    fn test_reduce_after_all_maps_done() {
        let mut coordinator = Coordinator::new(files(2), 2).unwrap();
        coordinator.assign();
        coordinator.assign();
        coordinator.record(Report::map(
            0,
            vec!["mr-temp-0-0".to_string(), "mr-temp-0-1".to_string()],
        ));
        coordinator.record(Report::map(1, vec!["mr-temp-1-1".to_string()]));
        assert!(coordinator.map_phase_complete());

        assert_eq!(
            coordinator.assign().0,
            Assignment::Reduce {
                task_id: 0,
                inputs: vec!["mr-temp-0-0".to_string()],
            }
        );
        assert_eq!(
            coordinator.assign().0,
            Assignment::Reduce {
                task_id: 1,
                inputs: vec!["mr-temp-0-1".to_string(), "mr-temp-1-1".to_string()],
            }
        );
        assert_eq!(coordinator.assign().0, Assignment::Wait);

        coordinator.record(Report::reduce(0));
        coordinator.record(Report::reduce(1));
        assert!(coordinator.is_done());
        assert_eq!(coordinator.assign().0, Assignment::Quit);
    }

    #[test]
    fn test_expired_task_is_reassigned() {
        let mut coordinator = Coordinator::new(files(2), 1).unwrap();
        let (_, first) = coordinator.assign();
        coordinator.assign();

        assert!(coordinator.expire(first.unwrap()));
        assert_eq!(coordinator.task(TaskPhase::Map, 0).unwrap().get_state(), TaskState::Failed);

        let (again, retry) = coordinator.assign();
        assert_eq!(map_task_id(&again), 0);
        assert_eq!(retry.unwrap().attempt, 2);

        // the first attempt's timer no longer applies
        assert!(!coordinator.expire(first.unwrap()));
        assert_eq!(coordinator.task(TaskPhase::Map, 0).unwrap().get_state(), TaskState::Assigned);
    }

    #[test]
    fn test_done_survives_timer() {
        let mut coordinator = Coordinator::new(files(1), 1).unwrap();
        let (_, attempt) = coordinator.assign();
        coordinator.record(Report::map(0, vec![]));

        assert!(!coordinator.expire(attempt.unwrap()));
        assert_eq!(coordinator.task(TaskPhase::Map, 0).unwrap().get_state(), TaskState::Done);
    }

    #[test]
    fn test_late_report_accepted_once() {
        let mut coordinator = Coordinator::new(files(1), 2).unwrap();
        let (_, attempt) = coordinator.assign();
        coordinator.expire(attempt.unwrap());
        coordinator.assign();

        // the timed-out worker reports first and is accepted
        assert_eq!(
            coordinator.record(Report::map(0, vec!["mr-temp-0-1".to_string()])),
            Recorded::Accepted {
                ignored_files: vec![]
            }
        );
        // the replacement's duplicate report must not double count
        assert_eq!(
            coordinator.record(Report::map(0, vec!["mr-temp-0-1".to_string()])),
            Recorded::AlreadyDone
        );

        assert_eq!(coordinator.intermediate_files(1), &["mr-temp-0-1".to_string()]);
        assert!(coordinator.intermediate_files(0).is_empty());
    }

    #[test]
    fn test_bad_reports_are_ignored() {
        let mut coordinator = Coordinator::new(files(1), 2).unwrap();
        coordinator.assign();
        assert_eq!(
            coordinator.record(Report::map(5, vec!["mr-temp-5-0".to_string()])),
            Recorded::UnknownTask
        );
        assert_eq!(
            coordinator.record(Report::map(
                0,
                vec!["mr-temp-0-9".to_string(), "garbage".to_string(), "mr-temp-0-0".to_string()],
            )),
            Recorded::Accepted {
                ignored_files: vec!["mr-temp-0-9".to_string(), "garbage".to_string()]
            }
        );

        assert_eq!(coordinator.intermediate_files(0), &["mr-temp-0-0".to_string()]);
        assert!(coordinator.intermediate_files(1).is_empty());
        assert!(coordinator.intermediate_files(9).is_empty());
    }

    #[test]
    fn test_report_for_unassigned_task_is_ignored() {
        let mut coordinator = Coordinator::new(files(1), 1).unwrap();

        assert_eq!(coordinator.record(Report::reduce(0)), Recorded::NotAssigned);
        assert_eq!(
            coordinator.record(Report::map(0, vec!["mr-temp-0-0".to_string()])),
            Recorded::NotAssigned
        );

        assert_eq!(coordinator.task(TaskPhase::Map, 0).unwrap().get_state(), TaskState::Unassigned);
        assert_eq!(coordinator.task(TaskPhase::Reduce, 0).unwrap().get_state(), TaskState::Unassigned);
        assert!(coordinator.intermediate_files(0).is_empty());
        assert!(!coordinator.is_done());
        assert_eq!(map_task_id(&coordinator.assign().0), 0);

        // a reduce report during the map phase cannot skip the barrier
        assert_eq!(coordinator.record(Report::reduce(0)), Recorded::NotAssigned);
        assert_eq!(coordinator.assign().0, Assignment::Wait);
        assert!(!coordinator.reduce_phase_complete());
    }

    #[test]
    fn test_no_input_files_goes_straight_to_reduce() {
        let mut coordinator = Coordinator::new(vec![], 1).unwrap();
        assert!(coordinator.map_phase_complete());
        assert_eq!(
            coordinator.assign().0,
            Assignment::Reduce {
                task_id: 0,
                inputs: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_scheduler_timer_fails_task() {
        let scheduler = Scheduler::new(Coordinator::new(files(1), 1).unwrap(), Duration::from_millis(50));

        let assignment = scheduler.request_work(None).await;
        assert_eq!(map_task_id(&assignment), 0);
        assert_eq!(scheduler.request_work(None).await, Assignment::Wait);

        sleep(Duration::from_millis(200)).await;
        let state = scheduler
            .inspect(|c| c.task(TaskPhase::Map, 0).unwrap().get_state())
            .await;
        assert_eq!(state, TaskState::Failed);
        assert_eq!(map_task_id(&scheduler.request_work(None).await), 0);
    }

    #[tokio::test]
    async fn test_scheduler_report_embedded_in_request() {
        let scheduler = Scheduler::new(Coordinator::new(files(1), 1).unwrap(), Duration::from_secs(10));

        scheduler.request_work(None).await;
        let next = scheduler
            .request_work(Some(Report::map(0, vec!["mr-temp-0-0".to_string()])))
            .await;
        assert_eq!(
            next,
            Assignment::Reduce {
                task_id: 0,
                inputs: vec!["mr-temp-0-0".to_string()],
            }
        );
        assert!(!scheduler.is_job_complete().await);

        assert_eq!(scheduler.request_work(Some(Report::reduce(0))).await, Assignment::Quit);
        assert!(scheduler.is_job_complete().await);
    }

    #[tokio::test]
    async fn test_scheduler_ignores_reduce_report_before_assignment() {
        let scheduler = Scheduler::new(Coordinator::new(files(1), 1).unwrap(), Duration::from_secs(10));

        let next = scheduler.request_work(Some(Report::reduce(0))).await;
        assert_eq!(map_task_id(&next), 0);
        assert_eq!(scheduler.request_work(Some(Report::reduce(0))).await, Assignment::Wait);
        assert!(!scheduler.is_job_complete().await);
    }
}
