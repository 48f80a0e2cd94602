//! The `watch` command: re-sync as source files change.
//!
//! A thin wrapper over the engine: change events are debounced into
//! batches, each batch mapped to its set of affected directories, and the
//! engine re-invoked once per batch. Invocations are strictly sequential;
//! every batch gets a fresh session so no cache outlives a sync.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use notify::{RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use depsync_core::Updater;

use crate::GlobalOptions;

/// Quiet period before a batch of change events is acted on.
const DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory to watch, relative to the repository root
    #[arg(default_value = ".")]
    pub path: String,
}

pub fn execute(args: WatchArgs, global: GlobalOptions) -> Result<()> {
    let root = global.repo_root()?;
    let watch_dir = root.join(args.path.trim_matches('/'));

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("failed to create watcher")?;
    watcher
        .watch(&watch_dir, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", watch_dir.display()))?;

    info!("watching {} for changes", watch_dir.display());
    loop {
        // Block for the first event, then drain the quiet period.
        let first = match rx.recv() {
            Ok(event) => event,
            Err(_) => return Ok(()),
        };
        let mut dirs = Vec::new();
        collect_dirs(&root, first, &mut dirs);
        while let Ok(event) = rx.recv_timeout(DEBOUNCE) {
            collect_dirs(&root, event, &mut dirs);
        }
        if dirs.is_empty() {
            continue;
        }

        info!("change detected in {dirs:?}");
        match sync(&root, &global.plz, &dirs) {
            Ok(()) => debug!("sync complete"),
            // Watch keeps running through bad intermediate states; the
            // next save triggers another attempt.
            Err(e) => warn!("sync failed: {e:#}"),
        }
    }
}

fn sync(root: &Path, plz: &str, dirs: &[String]) -> Result<()> {
    let mut updater = Updater::new(root, plz)?;
    let mut stdout = std::io::stdout();
    updater.update(dirs, true, &mut stdout)?;
    Ok(())
}

/// Map one filesystem event to affected package directories. Only Go
/// source changes re-trigger the engine; reacting to our own build-file
/// writes would loop.
fn collect_dirs(root: &Path, event: notify::Result<notify::Event>, dirs: &mut Vec<String>) {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            warn!("watch error: {e}");
            return;
        }
    };
    for path in event.paths {
        if path.extension().map(|e| e != "go").unwrap_or(true) {
            continue;
        }
        if path.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            name == "plz-out" || name.starts_with('.')
        }) {
            continue;
        }
        let Some(dir) = path.parent() else { continue };
        let rel = dir
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(dir));
        let rel = rel.to_string_lossy().into_owned();
        if !dirs.contains(&rel) {
            dirs.push(rel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(paths: &[&str]) -> notify::Result<notify::Event> {
        let mut e = notify::Event::new(notify::EventKind::Modify(
            notify::event::ModifyKind::Data(notify::event::DataChange::Content),
        ));
        e.paths = paths.iter().map(PathBuf::from).collect();
        Ok(e)
    }

    #[test]
    fn test_collect_dirs_maps_go_files_to_packages() {
        let root = Path::new("/repo");
        let mut dirs = Vec::new();
        collect_dirs(root, event(&["/repo/app/app.go", "/repo/app/other.go"]), &mut dirs);
        assert_eq!(dirs, vec!["app".to_string()]);
    }

    #[test]
    fn test_collect_dirs_ignores_non_go_and_output() {
        let root = Path::new("/repo");
        let mut dirs = Vec::new();
        collect_dirs(root, event(&["/repo/app/BUILD"]), &mut dirs);
        collect_dirs(root, event(&["/repo/plz-out/gen/x.go"]), &mut dirs);
        collect_dirs(root, event(&["/repo/.git/x.go"]), &mut dirs);
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_collect_dirs_reports_watch_errors_without_dirs() {
        let root = Path::new("/repo");
        let mut dirs = Vec::new();
        collect_dirs(
            root,
            Err(notify::Error::generic("backend gone")),
            &mut dirs,
        );
        assert!(dirs.is_empty());
    }
}
