use std::collections::HashMap;

use tracing::debug;

/// Split a `NAME=VALUE` assignment. The value may itself contain `=`.
pub fn split_assignment(assignment: &str) -> Option<(&str, &str)> {
    let (name, value) = assignment.split_once('=')?;
    if name.is_empty() {
        return None;
    }
    Some((name, value))
}

/// Merge assignment layers into a process environment. Later layers win on
/// key collisions; a key keeps the position of its first appearance.
pub fn merge_env<I, S>(layers: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut merged: Vec<(String, String)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for assignment in layers {
        let Some((name, value)) = split_assignment(assignment.as_ref()) else {
            debug!("Ignoring malformed environment entry: {:?}", assignment.as_ref());
            continue;
        };
        match positions.get(name) {
            Some(&idx) => merged[idx].1 = value.to_string(),
            None => {
                positions.insert(name.to_string(), merged.len());
                merged.push((name.to_string(), value.to_string()));
            }
        }
    }
    merged
}
