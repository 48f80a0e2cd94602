//! The `update` command: one full sync pass.

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use depsync_core::Updater;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Directories to sync, relative to the repository root; a trailing
    /// `/...` covers the subtree. Defaults to the whole repository.
    pub paths: Vec<String>,

    /// Print changed files to stdout instead of rewriting them
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

pub fn execute(args: UpdateArgs, global: GlobalOptions) -> Result<()> {
    let root = global.repo_root()?;
    debug!("repository root: {}", root.display());

    let paths = if args.paths.is_empty() {
        vec!["...".to_string()]
    } else {
        args.paths
    };

    let mut updater =
        Updater::new(&root, &global.plz).context("failed to initialize sync session")?;
    let mut stdout = std::io::stdout();
    updater
        .update(&paths, !args.dry_run, &mut stdout)
        .context("sync failed")?;
    Ok(())
}
