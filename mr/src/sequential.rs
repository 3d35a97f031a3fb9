//! Single-process reference run: every map, then one reduce over all keys.
//! Produces the same output format as the distributed job with one
//! partition.

use std::{fs, path::Path};
use tracing::info;

use crate::error::{MrError, MrResult};
use crate::task::KeyValue;
use crate::worker::Application;

/// Sorted `(key, result)` pairs for the whole input set.
pub fn compute(app: &dyn Application, files: &[String]) -> MrResult<Vec<(String, String)>> {
    let mut intermediate: Vec<KeyValue> = vec![];
    for file in files {
        let contents = fs::read_to_string(file).map_err(|e| MrError::io(file, e))?;
        intermediate.extend(app.map(file, &contents));
    }
    intermediate.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(intermediate
        .chunk_by(|a, b| a.key == b.key)
        .map(|group| {
            let values: Vec<String> = group.iter().map(|kv| kv.value.clone()).collect();
            (group[0].key.clone(), app.reduce(&group[0].key, &values))
        })
        .collect())
}

/// Writes the reference result to `output` as `"<key> <value>"` lines.
pub fn run(app: &dyn Application, files: &[String], output: &Path) -> MrResult<()> {
    let result = compute(app, files)?;
    let contents: String = result
        .iter()
        .map(|(k, v)| format!("{} {}\n", k, v))
        .collect();
    fs::write(output, contents).map_err(|e| MrError::io(output, e))?;
    info!("wrote {} keys to {}", result.len(), output.display());
    Ok(())
}
