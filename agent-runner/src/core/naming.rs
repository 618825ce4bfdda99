//! Branch, directory and shell-argument naming.

use std::sync::LazyLock;

use regex::Regex;

const SLUG_MAX_LEN: usize = 40;

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

/// Lowercase, dash-separated slug of a task description (at most 40 chars).
pub fn branch_slug(task: &str) -> String {
    let lowered = task.trim().to_lowercase();
    let dashed = NON_SLUG.replace_all(&lowered, "-");
    let trimmed = dashed.trim_matches('-');
    let truncated: String = trimmed.chars().take(SLUG_MAX_LEN).collect();
    let slug = truncated.trim_end_matches('-');
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug.to_string()
    }
}

/// `feat/<slug>-<run id>`.
pub fn default_branch(task: &str, run_id: &str) -> String {
    format!("feat/{}-{run_id}", branch_slug(task))
}

/// Flat directory name for a branch's working tree.
pub fn workdir_name(prefix: &str, branch: &str) -> String {
    let sanitized: String = branch
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    format!("{prefix}{sanitized}")
}

/// Quote `input` for a POSIX shell unless it is made only of safe characters.
pub fn shell_escape(input: &str) -> String {
    if !input.is_empty()
        && input
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '='))
    {
        return input.to_string();
    }
    let mut escaped = String::from("'");
    for ch in input.chars() {
        if ch == '\'' {
            escaped.push_str("'\"'\"'");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}
