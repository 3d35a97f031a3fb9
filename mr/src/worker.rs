use std::{
    collections::BTreeMap,
    fs,
    future::Future,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};
use tarpc::{client, context, tokio_serde::formats::Json};
use tempfile::NamedTempFile;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::coordinator::Scheduler;
use crate::error::{MrError, MrResult};
use crate::partition::{intermediate_name, output_name, partition_for};
use crate::rpc::{Assignment, Report, RpcClient};
use crate::task::KeyValue;

pub type MapFn = fn(&str, &str) -> Vec<KeyValue>;
pub type ReduceFn = fn(&str, &[String]) -> String;

/// The caller-supplied transformation run by workers.
pub trait Application: Send + Sync {
    fn map(&self, source: &str, contents: &str) -> Vec<KeyValue>;
    fn reduce(&self, key: &str, values: &[String]) -> String;
}

/// An [`Application`] made of two plain functions.
#[derive(Clone, Copy)]
pub struct Functions {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

impl Application for Functions {
    fn map(&self, source: &str, contents: &str) -> Vec<KeyValue> {
        (self.map_fn)(source, contents)
    }

    fn reduce(&self, key: &str, values: &[String]) -> String {
        (self.reduce_fn)(key, values)
    }
}

/// Where a worker pulls assignments from.
pub trait WorkSource: Send + Sync {
    fn request_work(
        &self,
        report: Option<Report>,
    ) -> impl Future<Output = MrResult<Assignment>> + Send;
}

impl WorkSource for RpcClient {
    async fn request_work(&self, report: Option<Report>) -> MrResult<Assignment> {
        Ok(RpcClient::request_work(self, context::current(), report).await?)
    }
}

/// In-process scheduler, no transport in between.
impl WorkSource for Scheduler {
    async fn request_work(&self, report: Option<Report>) -> MrResult<Assignment> {
        Ok(Scheduler::request_work(self, report).await)
    }
}

/// Connects to the coordinator's UNIX socket.
pub async fn connect(socket: &Path) -> MrResult<RpcClient> {
    let transport = tarpc::serde_transport::unix::connect(socket, Json::default)
        .await
        .map_err(|e| MrError::io(socket, e))?;
    Ok(RpcClient::new(client::Config::default(), transport).spawn())
}

/// Pulls assignments from a [`WorkSource`] and runs them with an [`Application`].
pub struct Worker<S> {
    source: S,
    app: Arc<dyn Application>,
    config: WorkerConfig,
}

impl<S: WorkSource> Worker<S> {
    pub fn new(source: S, app: Arc<dyn Application>, config: WorkerConfig) -> Self {
        Worker {
            source,
            app,
            config,
        }
    }

    /// Pulls and executes assignments until told to quit or the
    /// coordinator becomes unreachable. Local file errors end the loop
    /// with an error; the coordinator reassigns the task after its timeout.
    pub async fn run(&self) -> MrResult<()> {
        let mut report = None;
        loop {
            let assignment = match self.source.request_work(report.take()).await {
                Ok(assignment) => assignment,
                Err(e) => {
                    warn!("coordinator unreachable, exiting: {}", e);
                    return Ok(());
                }
            };
            debug!("got assignment: {:?}", assignment);

            match assignment {
                Assignment::Quit => {
                    info!("job complete, worker exiting");
                    return Ok(());
                }
                Assignment::Wait => sleep(self.config.wait_interval).await,
                Assignment::Map {
                    task_id,
                    inputs,
                    reduce_count,
                } => {
                    let app = Arc::clone(&self.app);
                    let dir = self.config.work_dir.clone();
                    let produced = tokio::task::spawn_blocking(move || {
                        do_map(app.as_ref(), task_id, &inputs, reduce_count, &dir)
                    })
                    .await??;
                    info!("map task {} produced {} files", task_id, produced.len());
                    report = Some(Report::map(task_id, produced));
                }
                Assignment::Reduce { task_id, inputs } => {
                    let app = Arc::clone(&self.app);
                    let dir = self.config.work_dir.clone();
                    let output = tokio::task::spawn_blocking(move || {
                        do_reduce(app.as_ref(), task_id, &inputs, &dir)
                    })
                    .await??;
                    info!("reduce task {} wrote {}", task_id, output.display());
                    report = Some(Report::reduce(task_id));
                }
            }
        }
    }
}

/// Runs one map task: applies the map function to every input, splits the
/// records into `reduce_count` partitions and publishes one intermediate
/// file per non-empty partition. Returns the published paths.
pub fn do_map(
    app: &dyn Application,
    task_id: usize,
    inputs: &[String],
    reduce_count: usize,
    dir: &Path,
) -> MrResult<Vec<String>> {
    let mapped: Vec<MrResult<Vec<KeyValue>>> = thread::scope(|s| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|file| {
                s.spawn(move || -> MrResult<Vec<KeyValue>> {
                    let contents = fs::read_to_string(file).map_err(|e| MrError::io(file, e))?;
                    Ok(app.map(file, &contents))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
            .collect()
    });

    let mut partitions: BTreeMap<usize, Vec<KeyValue>> = BTreeMap::new();
    for records in mapped {
        for kv in records? {
            partitions
                .entry(partition_for(&kv.key, reduce_count))
                .or_default()
                .push(kv);
        }
    }

    // each partition goes to its own file, so the writes are independent
    let written: Vec<MrResult<PathBuf>> = thread::scope(|s| {
        let handles: Vec<_> = partitions
            .iter()
            .map(|(&r, records)| {
                s.spawn(move || -> MrResult<PathBuf> {
                    let path = dir.join(intermediate_name(task_id, r));
                    publish(&path, |w| {
                        for kv in records {
                            serde_json::to_writer(&mut *w, kv)
                                .map_err(|e| MrError::Codec {
                                    path: path.clone(),
                                    source: e,
                                })?;
                            w.write_all(b"\n").map_err(|e| MrError::io(&path, e))?;
                        }
                        Ok(())
                    })?;
                    Ok(path)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
            .collect()
    });

    written
        .into_iter()
        .map(|path| Ok(path?.to_string_lossy().into_owned()))
        .collect()
}

/// Runs one reduce task over the given intermediate files and publishes
/// `mr-out-<task_id>`, one `"<key> <value>"` line per distinct key in
/// ascending key order.
pub fn do_reduce(
    app: &dyn Application,
    task_id: usize,
    inputs: &[String],
    dir: &Path,
) -> MrResult<PathBuf> {
    let mut intermediate: Vec<KeyValue> = vec![];
    for file in inputs {
        intermediate.extend(load_intermediate(Path::new(file))?);
    }
    // stable, so values keep their file order within a key
    intermediate.sort_by(|a, b| a.key.cmp(&b.key));

    let path = dir.join(output_name(task_id));
    publish(&path, |w| {
        for group in intermediate.chunk_by(|a, b| a.key == b.key) {
            let key = &group[0].key;
            let values: Vec<String> = group.iter().map(|kv| kv.value.clone()).collect();
            let result = app.reduce(key, &values);
            writeln!(w, "{} {}", key, result).map_err(|e| MrError::io(&path, e))?;
        }
        Ok(())
    })?;
    Ok(path)
}

/// Writes through a temporary file in the destination directory and renames
/// it into place, so `path` only ever holds complete contents.
fn publish(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&mut NamedTempFile>) -> MrResult<()>,
) -> MrResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| MrError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        write(&mut writer)?;
        writer.flush().map_err(|e| MrError::io(path, e))?;
    }
    tmp.persist(path).map_err(|e| MrError::Publish {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn load_intermediate(path: &Path) -> MrResult<Vec<KeyValue>> {
    let file = fs::File::open(path).map_err(|e| MrError::io(path, e))?;
    let mut result = vec![];
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| MrError::io(path, e))?;
        if line.is_empty() {
            continue;
        }
        let kv = serde_json::from_str(&line).map_err(|e| MrError::Codec {
            path: path.to_path_buf(),
            source: e,
        })?;
        result.push(kv);
    }
    Ok(result)
}
