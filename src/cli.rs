use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "corral",
    about = "Supervise concurrent coding-agent sessions in git worktrees and tmux",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Project directory (defaults to the current directory).
    #[arg(global = true, short, long)]
    pub path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive controller (the default).
    Run {
        /// Agent program to start in new instances, overriding the config.
        #[arg(long)]
        program: Option<String>,
    },
    /// List stored instances without starting the UI.
    Sessions,
    /// Delete all stored instance state.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}
