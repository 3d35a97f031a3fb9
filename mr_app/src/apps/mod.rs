//! Map/reduce applications bundled with the worker binaries.

use clap::ValueEnum;
use mr::{Application, Functions};

mod crash;
mod indexer;
mod wc;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AppName {
    /// Word count
    Wc,
    /// Inverted index: word -> documents containing it
    Indexer,
    /// Randomly crashes or stalls, for exercising recovery
    Crash,
}

pub fn load(name: AppName) -> Box<dyn Application> {
    match name {
        AppName::Wc => Box::new(Functions {
            map_fn: wc::map_function,
            reduce_fn: wc::reduce_function,
        }),
        AppName::Indexer => Box::new(Functions {
            map_fn: indexer::map_function,
            reduce_fn: indexer::reduce_function,
        }),
        AppName::Crash => Box::new(Functions {
            map_fn: crash::map_function,
            reduce_fn: crash::reduce_function,
        }),
    }
}
