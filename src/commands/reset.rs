use anyhow::Result;
use std::io::{self, BufRead, Write};

use crate::session::InstanceStorage;

/// Delete the stored instance state. Worktrees and tmux sessions are left
/// alone; this only forgets what the controller knew about them.
pub async fn execute(force: bool) -> Result<()> {
    if !force {
        print!("Delete all stored instance state? [y/N] ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let storage = InstanceStorage::new(InstanceStorage::default_dir());
    storage.wipe().await?;
    println!("State cleared.");
    Ok(())
}
