// src/chat/command.rs

/// Command words stripped from the start of inline text, longest first
const COMMAND_WORDS: [&str; 6] = ["/gal选项", "gal选项", "/选项", "选项", "/gal", "gal"];

/// Words that trigger option generation when the platform did not route the
/// message as a command (e.g. a reply segment was placed before the text)
const TRIGGER_WORDS: [&str; 4] = ["/选项", "选项", "/gal", "gal"];

pub const MIN_OPTIONS: usize = 1;
pub const MAX_OPTIONS: usize = 26;

/// Text following the command word, trimmed. A bare count (`/gal 4`) is not
/// treated as inline text.
pub fn strip_command(text: &str) -> String {
    let text = text.trim();
    let rest = COMMAND_WORDS
        .iter()
        .find_map(|word| text.strip_prefix(word))
        .unwrap_or(text)
        .trim();
    if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
        return String::new();
    }
    rest.to_string()
}

pub fn is_trigger(text: &str) -> bool {
    let text = text.trim().trim_start_matches('*').trim_start();
    TRIGGER_WORDS.iter().any(|word| text.starts_with(word))
}

/// Last run of ASCII digits in `text`, clamped to `min..=max`; `default`
/// (also clamped) when there is none
pub fn parse_count(text: &str, default: usize, min: usize, max: usize) -> usize {
    let last = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .last();
    let n = match last {
        Some(run) => run.parse::<usize>().unwrap_or(usize::MAX),
        None => default,
    };
    n.clamp(min, max)
}
