//! Metric name expansion and batching.

/// Expands a name pattern into concrete metric names.
///
/// Top-level commas separate independent names, and each `{a,b,c}` group
/// expands to one name per alternative with the surrounding text held
/// fixed. Several groups in one name expand to their cartesian product, in
/// the order the alternatives are written. Empty names are dropped.
pub fn split_name(pattern: &str) -> Vec<String> {
    split_top_level(pattern)
        .into_iter()
        .flat_map(expand_braces)
        .filter(|name| !name.is_empty())
        .collect()
}

fn split_top_level(pattern: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (i, c) in pattern.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&pattern[from..i]);
                from = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&pattern[from..]);
    parts
}

fn expand_braces(name: &str) -> Vec<String> {
    let Some(open) = name.find('{') else {
        return vec![name.to_string()];
    };
    let Some(close) = name[open..].find('}').map(|i| open + i) else {
        // unbalanced, keep literally
        return vec![name.to_string()];
    };

    let prefix = &name[..open];
    let suffixes = expand_braces(&name[close + 1..]);
    name[open + 1..close]
        .split(',')
        .flat_map(|alt| {
            suffixes
                .iter()
                .map(move |suffix| format!("{}{}{}", prefix, alt, suffix))
        })
        .collect()
}

/// Splits `names` into consecutive batches of at most `limit` names.
pub fn group_names(names: &[String], limit: usize) -> Vec<Vec<String>> {
    names
        .chunks(limit.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}
