use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

use crate::models::{PrComment, PullRequest};

/// Fetch the pull request for `branch` through the `gh` CLI, comments
/// included. Always fetches fresh; the review overlay must never show stale
/// comments.
pub async fn fetch_pull_request(worktree: &Path, branch: &str) -> Result<PullRequest> {
    let output = Command::new("gh")
        .args([
            "pr",
            "view",
            branch,
            "--json",
            "number,title,url,body,comments",
        ])
        .current_dir(worktree)
        .output()
        .await
        .context("Failed to run gh pr view — is the gh CLI installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("gh pr view failed: {}", stderr.trim());
    }

    parse_pr_json(&String::from_utf8_lossy(&output.stdout))
}

fn parse_pr_json(json: &str) -> Result<PullRequest> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("gh pr view returned invalid JSON")?;

    let comments = value["comments"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|c| PrComment {
                    author: c["author"]["login"]
                        .as_str()
                        .unwrap_or("unknown")
                        .to_string(),
                    body: c["body"].as_str().unwrap_or("").to_string(),
                    path: c["path"].as_str().map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PullRequest {
        number: value["number"].as_u64().context("PR number missing")?,
        title: value["title"].as_str().unwrap_or("").to_string(),
        url: value["url"].as_str().unwrap_or("").to_string(),
        body: value["body"].as_str().unwrap_or("").to_string(),
        comments,
    })
}
