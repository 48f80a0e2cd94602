//! depsync - keep BUILD file dependencies in sync with Go imports
//!
//! # Usage
//!
//! ```bash
//! # Sync the whole repository
//! depsync update
//!
//! # Sync one subtree, printing changes without writing
//! depsync update --dry-run src/server/...
//!
//! # Re-sync automatically as sources change
//! depsync watch
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// depsync - BUILD file dependency synchronization for Go
#[derive(Parser, Debug)]
#[command(name = "depsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Repository root (default: discovered from the working directory)
    #[arg(long, short = 'r', global = true, env = "DEPSYNC_ROOT")]
    root: Option<PathBuf>,

    /// Build tool executable
    #[arg(long, global = true, env = "DEPSYNC_PLZ", default_value = "plz")]
    plz: String,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// The repository root: explicit flag, else the nearest ancestor of the
    /// working directory carrying a workspace marker.
    fn repo_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        let cwd = std::env::current_dir()?;
        find_repo_root(&cwd).ok_or_else(|| {
            anyhow::anyhow!(
                "no .plzconfig or depsync.json found above {}; pass --root",
                cwd.display()
            )
        })
    }
}

/// Walk up from `dir` looking for a workspace marker file.
fn find_repo_root(dir: &std::path::Path) -> Option<PathBuf> {
    let mut current = dir;
    loop {
        if current.join(".plzconfig").is_file()
            || current.join(depsync_config::CONFIG_FILE_NAME).is_file()
        {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync BUILD rules and dependencies for the given directories
    Update(commands::update::UpdateArgs),

    /// Watch the tree and re-sync as source files change
    Watch(commands::watch::WatchArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Update(args) => commands::update::execute(args, cli.global),
        Commands::Watch(args) => commands::watch::execute(args, cli.global),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_repo_root() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join(".plzconfig"), "").unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_repo_root(&nested), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_find_repo_root_depsync_marker() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("depsync.json"), "{}").unwrap();
        assert_eq!(
            find_repo_root(temp.path()),
            Some(temp.path().to_path_buf())
        );
    }
}
