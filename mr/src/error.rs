//! Error types for coordinator and worker operations

use std::path::PathBuf;
use thiserror::Error;

pub type MrResult<T> = Result<T, MrError>;

#[derive(Error, Debug)]
pub enum MrError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },

    #[error("RPC to coordinator failed: {0}")]
    Transport(#[from] tarpc::client::RpcError),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Task execution panicked: {0}")]
    Panicked(#[from] tokio::task::JoinError),
}

impl MrError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> MrError {
        MrError::Io {
            path: path.into(),
            source,
        }
    }
}
