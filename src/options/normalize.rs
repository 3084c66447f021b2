// src/options/normalize.rs

/// Placeholder body used when the model produced fewer lines than requested
pub const PLACEHOLDER: &str = "…";

const MAX_LABELS: usize = 26;

/// First `n` capital letters, capped at 26
pub fn letters(n: usize) -> Vec<char> {
    (b'A'..=b'Z').take(n.min(MAX_LABELS)).map(char::from).collect()
}

/// True for lines shaped like `A. text`: one letter, a period, then a space.
/// Anything after that space (more spaces included) is the option body.
pub fn is_prelabelled(line: &str) -> bool {
    let mut chars = line.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(label), Some('.'), Some(' ')) => label.is_alphabetic(),
        _ => false,
    }
}

/// Turn free-form model output into exactly `n` labelled choice lines.
///
/// Lines already shaped like `X. text` are taken first, in order. Remaining
/// slots are filled from the other non-empty lines with a positional label,
/// then padded with placeholders. The result length is `min(n, 26)`.
pub fn normalize_options(raw: &str, n: usize) -> Vec<String> {
    let labels = letters(n);
    let n = labels.len();

    let (labelled, other): (Vec<&str>, Vec<&str>) = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .partition(|line| is_prelabelled(line));

    let mut result: Vec<String> = labelled
        .into_iter()
        .take(n)
        .map(str::to_string)
        .collect();

    let mut rest = other.into_iter();
    while result.len() < n {
        let Some(line) = rest.next() else { break };
        result.push(format!("{}. {}", labels[result.len()], line));
    }

    while result.len() < n {
        result.push(format!("{}. {}", labels[result.len()], PLACEHOLDER));
    }

    result.truncate(n);
    result
}
