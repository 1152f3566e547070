use sha2::{Digest, Sha256};
use std::path::Path;

const BRANCH_NAME_MAX_LEN: usize = 50;

/// Turn a free-form instance title into a usable git branch name.
pub fn sanitize_branch_name(input: &str) -> String {
    let sanitized: String = input
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let collapsed = sanitized
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let truncated = if collapsed.len() > BRANCH_NAME_MAX_LEN {
        &collapsed[..BRANCH_NAME_MAX_LEN]
    } else {
        &collapsed
    };

    let result = truncated.trim_end_matches('-').to_string();

    if result.is_empty() {
        "unnamed".to_string()
    } else {
        result
    }
}

/// Truncates a string to max_chars characters, appending "..." if truncated.
/// Safe for UTF-8 multi-byte characters.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncate_at = max_chars.saturating_sub(3);
        let byte_index = s
            .char_indices()
            .nth(truncate_at)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        format!("{}...", &s[..byte_index])
    }
}

/// Derive the tmux session name for a worktree path.
///
/// The name must be stable across restarts (a restarted controller has to
/// find sessions it created earlier) and unique per worktree, so it is a
/// short hash of the absolute worktree path.
pub fn session_name_for_worktree(path: &Path) -> String {
    let abs_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(abs_path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    format!("corral-{}", hex::encode(&digest[..4]))
}
