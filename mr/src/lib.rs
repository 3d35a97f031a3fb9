pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod partition;
pub mod rpc;
pub mod sequential;
pub mod task;
pub mod worker;

pub use error::{MrError, MrResult};
pub use task::KeyValue;
pub use worker::{Application, Functions};
