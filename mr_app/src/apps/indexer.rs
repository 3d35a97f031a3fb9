use std::collections::BTreeSet;

use mr::KeyValue;

/// Emits `(word, document)` once per distinct word in the document.
pub fn map_function(document: &str, value: &str) -> Vec<KeyValue> {
    value
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|word| KeyValue::new(word, document))
        .collect()
}

/// `"<count> <doc1>,<doc2>,..."` with documents sorted.
pub fn reduce_function(_key: &str, values: &[String]) -> String {
    let mut documents = values.to_vec();
    documents.sort();
    documents.dedup();
    format!("{} {}", documents.len(), documents.join(","))
}
