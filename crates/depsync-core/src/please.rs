//! Interface to the external build tool process.
//!
//! Two invocations are consumed: `plz build -p <target>` to materialize a
//! target's outputs, and `plz query print --json --field=provides` to chase
//! "provides" redirections — rules like proto libraries don't compile Go
//! themselves but name the generated target that satisfies the `go`
//! requirement. Chains are followed until a fixed point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// The requirement chased through provides maps.
const GO_REQUIREMENT: &str = "go";

/// Errors from invoking the build tool.
#[derive(Debug, Error)]
pub enum PleaseError {
    /// The process could not be spawned
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully
    #[error("{tool} {args:?} failed: {stderr}")]
    Failed {
        tool: String,
        args: Vec<String>,
        stderr: String,
    },

    /// Query output was not the expected JSON
    #[error("unparseable query output: {0}")]
    BadOutput(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct PrintedTarget {
    #[serde(default)]
    provides: HashMap<String, String>,
}

/// Handle on the external build tool.
#[derive(Debug, Clone)]
pub struct Please {
    /// Executable name or path, normally `plz`
    tool: String,

    /// Repository root the tool runs in
    repo_root: PathBuf,
}

impl Please {
    pub fn new(tool: impl Into<String>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            repo_root: repo_root.into(),
        }
    }

    /// Build `target` and return its output file paths.
    pub fn build(&self, target: &str) -> Result<Vec<PathBuf>, PleaseError> {
        let stdout = self.execute(&["build", "-p", target])?;
        Ok(stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Resolve what each of `targets` provides for the `go` requirement,
    /// following redirection chains until a fixed point. Targets providing
    /// nothing map to themselves.
    pub fn resolve_provides(&self, targets: &[String]) -> Result<Vec<String>, PleaseError> {
        let mut current: Vec<String> = targets.to_vec();
        loop {
            let mut args = vec!["query", "print", "--json", "--field=provides"];
            for t in &current {
                args.push(t);
            }
            let stdout = self.execute(&args)?;
            let printed: HashMap<String, PrintedTarget> = serde_json::from_str(&stdout)?;
            let next = follow_provides(&current, &printed);
            if next == current {
                return Ok(next);
            }
            debug!("provides redirected {current:?} -> {next:?}");
            current = next;
        }
    }

    fn execute(&self, args: &[&str]) -> Result<String, PleaseError> {
        debug!("running {} {args:?}", self.tool);
        let output = Command::new(&self.tool)
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|source| PleaseError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(PleaseError::Failed {
                tool: self.tool.clone(),
                args: args.iter().map(|s| s.to_string()).collect(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }
}

/// One step of provides-following over an already-fetched map.
fn follow_provides(
    targets: &[String],
    printed: &HashMap<String, PrintedTarget>,
) -> Vec<String> {
    targets
        .iter()
        .map(|t| {
            printed
                .get(t)
                .and_then(|p| p.provides.get(GO_REQUIREMENT))
                .cloned()
                .unwrap_or_else(|| t.clone())
        })
        .collect()
}
