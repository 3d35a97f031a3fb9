// sometimes crashes and sometimes takes a long time,
// so the coordinator has to reassign work

use mr::KeyValue;
use rand::Rng;
use std::{thread::sleep, time::Duration};

fn maybe_crash() {
    let mut rng = rand::thread_rng();
    let roll = rng.gen_range(0..1000);
    if roll < 330 {
        std::process::exit(1);
    } else if roll < 660 {
        sleep(Duration::from_millis(rng.gen_range(0..10_000)));
    }
}

pub fn map_function(filename: &str, contents: &str) -> Vec<KeyValue> {
    maybe_crash();

    vec![
        KeyValue::new("a", filename),
        KeyValue::new("b", filename.len().to_string()),
        KeyValue::new("c", contents.len().to_string()),
        KeyValue::new("d", "xyzzy"),
    ]
}

pub fn reduce_function(_key: &str, values: &[String]) -> String {
    maybe_crash();

    let mut values = values.to_vec();
    values.sort();
    values.join(" ")
}
