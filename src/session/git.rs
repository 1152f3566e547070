use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Commit-subject prefix that marks a commit as a bookmark.
pub const BOOKMARK_PREFIX: &str = "bookmark: ";

fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Path contains non-UTF8 characters: {:?}", path))
}

async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Resolve the main working-tree root from any path inside the repository,
/// including from inside a linked worktree.
pub async fn resolve_git_root(project_path: &Path) -> Result<PathBuf> {
    let stdout = git(
        project_path,
        &["rev-parse", "--path-format=absolute", "--git-common-dir"],
    )
    .await
    .context("is this a git repository?")?;

    let common_dir = PathBuf::from(stdout.trim());
    // --git-common-dir returns the .git directory; its parent is the root
    Ok(common_dir
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| project_path.to_path_buf()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkCommit {
    pub sha: String,
    pub subject: String,
}

/// Creates and removes the isolated worktrees instances live in.
///
/// Worktrees are kept under `.corral/worktrees/<branch>` off the main
/// repository root so `git worktree list` stays tidy and cleanup is one
/// directory removal.
#[derive(Clone)]
pub struct WorktreeService {
    git_root: PathBuf,
}

impl WorktreeService {
    pub fn new(git_root: PathBuf) -> Self {
        Self { git_root }
    }

    pub async fn resolve(project_path: PathBuf) -> Result<Self> {
        let git_root = resolve_git_root(&project_path).await?;
        Ok(Self::new(git_root))
    }

    pub fn git_root(&self) -> &Path {
        &self.git_root
    }

    pub fn worktree_dir(&self) -> PathBuf {
        self.git_root.join(".corral").join("worktrees")
    }

    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        self.worktree_dir().join(branch)
    }

    /// Create a worktree for `branch`, creating the branch when it does not
    /// exist yet. `base` selects the starting point for a new branch.
    pub async fn create_worktree(&self, branch: &str, base: Option<&str>) -> Result<PathBuf> {
        let wt_path = self.worktree_path(branch);

        tokio::fs::create_dir_all(self.worktree_dir())
            .await
            .context("Failed to create worktrees directory")?;

        let wt_path_str = path_to_str(&wt_path)?;

        // Existing branch first, then -b with an optional base.
        if git(&self.git_root, &["worktree", "add", wt_path_str, branch])
            .await
            .is_ok()
        {
            return Ok(wt_path);
        }

        let mut args = vec!["worktree", "add", wt_path_str, "-b", branch];
        if let Some(base) = base {
            args.push(base);
        }
        git(&self.git_root, &args).await?;

        Ok(wt_path)
    }

    pub async fn remove_worktree(&self, branch: &str) -> Result<()> {
        let wt_path = self.worktree_path(branch);
        let wt_path_str = path_to_str(&wt_path)?;
        git(&self.git_root, &["worktree", "remove", "--force", wt_path_str]).await?;
        git(&self.git_root, &["branch", "-D", branch]).await.ok();
        Ok(())
    }

    pub async fn local_branches(&self) -> Result<Vec<String>> {
        let stdout = git(&self.git_root, &["branch", "--format=%(refname:short)"]).await?;
        Ok(stdout.lines().map(|l| l.trim().to_string()).collect())
    }
}

/// Version-control operations scoped to one instance's worktree.
///
/// Every method is fallible and potentially slow; callers must invoke them
/// from scheduled async commands, never from the dispatcher path.
#[derive(Clone)]
pub struct GitWorktree {
    worktree_path: PathBuf,
}

impl GitWorktree {
    pub fn new(worktree_path: PathBuf) -> Self {
        Self { worktree_path }
    }

    pub fn path(&self) -> &Path {
        &self.worktree_path
    }

    /// Colored diff between two commits, or of the working tree against a
    /// commit when `to` is `None`.
    pub async fn diff(&self, from: &str, to: Option<&str>) -> Result<String> {
        match to {
            Some(to) => {
                git(
                    &self.worktree_path,
                    &["diff", "--color=always", &format!("{}..{}", from, to)],
                )
                .await
            }
            None => {
                git(&self.worktree_path, &["diff", "--color=always", from]).await
            }
        }
    }

    /// Full diff of the branch when there is no older bound (branch creation).
    pub async fn diff_up_to(&self, to: &str) -> Result<String> {
        let base = self.merge_base_with_main().await?;
        self.diff(&base, Some(to)).await
    }

    pub async fn commit_history(&self, n: usize) -> Result<Vec<String>> {
        let count = format!("-{}", n);
        let stdout = git(
            &self.worktree_path,
            &["log", "--format=%h %s", count.as_str()],
        )
        .await?;
        Ok(stdout.lines().map(|l| l.to_string()).collect())
    }

    pub async fn changed_files_between(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let range = format!("{}..{}", from, to);
        let stdout = git(
            &self.worktree_path,
            &["diff", "--name-status", range.as_str()],
        )
        .await?;
        Ok(stdout.lines().map(|l| l.to_string()).collect())
    }

    pub async fn changed_files_since(&self, sha: &str) -> Result<Vec<String>> {
        let stdout = git(&self.worktree_path, &["diff", "--name-status", sha]).await?;
        Ok(stdout.lines().map(|l| l.to_string()).collect())
    }

    pub async fn has_changes_since(&self, sha: &str) -> Result<bool> {
        Ok(!self.changed_files_since(sha).await?.is_empty())
    }

    pub async fn current_branch(&self) -> Result<String> {
        let stdout = git(&self.worktree_path, &["branch", "--show-current"]).await?;
        let branch = stdout.trim().to_string();
        if branch.is_empty() {
            anyhow::bail!("HEAD is detached, no current branch");
        }
        Ok(branch)
    }

    pub async fn head_sha(&self) -> Result<String> {
        let stdout = git(&self.worktree_path, &["rev-parse", "HEAD"]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Resolve the repository's trunk branch: origin/HEAD when set, then
    /// `main`, then `master`.
    pub async fn main_branch(&self) -> Result<String> {
        if let Ok(stdout) = git(
            &self.worktree_path,
            &["symbolic-ref", "refs/remotes/origin/HEAD", "--short"],
        )
        .await
        {
            if let Some(name) = stdout.trim().strip_prefix("origin/") {
                return Ok(name.to_string());
            }
        }

        for candidate in ["main", "master"] {
            let refname = format!("refs/heads/{}", candidate);
            if git(&self.worktree_path, &["show-ref", "--verify", "--quiet", &refname])
                .await
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }

        anyhow::bail!("Could not determine the main branch")
    }

    async fn merge_base_with_main(&self) -> Result<String> {
        let main = self.main_branch().await?;
        let stdout = git(&self.worktree_path, &["merge-base", "HEAD", &main]).await?;
        Ok(stdout.trim().to_string())
    }

    pub async fn rebase_onto(&self, branch: &str) -> Result<()> {
        if let Err(e) = git(&self.worktree_path, &["rebase", branch]).await {
            // Leave the worktree clean for the operator.
            git(&self.worktree_path, &["rebase", "--abort"]).await.ok();
            return Err(e);
        }
        Ok(())
    }

    pub async fn reset_to_remote(&self, remote: &str, branch: &str) -> Result<()> {
        git(&self.worktree_path, &["fetch", remote, branch]).await?;
        let target = format!("{}/{}", remote, branch);
        git(&self.worktree_path, &["reset", "--hard", &target]).await?;
        Ok(())
    }

    pub async fn create_bookmark_commit(&self, message: &str) -> Result<String> {
        git(&self.worktree_path, &["add", "-A"]).await?;
        let subject = format!("{}{}", BOOKMARK_PREFIX, message);
        git(
            &self.worktree_path,
            &["commit", "--allow-empty", "-m", &subject],
        )
        .await?;
        self.head_sha().await
    }

    /// All bookmark commits on the branch, oldest to newest.
    pub async fn bookmark_commits(&self) -> Result<Vec<BookmarkCommit>> {
        let stdout = git(
            &self.worktree_path,
            &["log", "--reverse", "--format=%H%x09%s"],
        )
        .await?;

        Ok(stdout
            .lines()
            .filter_map(|line| {
                let (sha, subject) = line.split_once('\t')?;
                subject.starts_with(BOOKMARK_PREFIX).then(|| BookmarkCommit {
                    sha: sha.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }

    pub async fn push_changes(&self, message: &str, with_force: bool) -> Result<()> {
        git(&self.worktree_path, &["add", "-A"]).await?;
        // Nothing staged is fine; push whatever is committed.
        git(&self.worktree_path, &["commit", "-m", message])
            .await
            .ok();

        let branch = self.current_branch().await?;
        let mut args = vec!["push", "--set-upstream", "origin"];
        if with_force {
            args.push("--force-with-lease");
        }
        args.push(&branch);
        git(&self.worktree_path, &args).await?;
        Ok(())
    }

    pub async fn status_short(&self) -> Result<String> {
        git(&self.worktree_path, &["status", "--short", "--branch"]).await
    }
}
