use mr::KeyValue;

pub fn map_function(_key: &str, value: &str) -> Vec<KeyValue> {
    let mut output = Vec::new();
    let words = value.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty());

    for word in words {
        output.push(KeyValue::new(word, "1"));
    }

    output
}

pub fn reduce_function(_key: &str, values: &[String]) -> String {
    let mut count = 0;
    for item in values {
        count += item.parse::<u64>().unwrap_or(0);
    }

    count.to_string()
}
