//! Parser for the go.mod manifests served by the module proxy.
//!
//! Only the directives the resolver consumes are interpreted: `module`,
//! `require` and `replace` (single-line and block forms). Everything else
//! (`go`, `toolchain`, `exclude`, `retract`) is skipped without error.

use thiserror::Error;

/// Errors from parsing a manifest payload.
#[derive(Debug, Error)]
pub enum ModFileError {
    /// The manifest has no module directive
    #[error("go.mod manifest is missing a module directive")]
    MissingModule,

    /// A directive line could not be interpreted
    #[error("malformed {directive} directive on line {line}: {text}")]
    Malformed {
        directive: &'static str,
        line: usize,
        text: String,
    },
}

/// One `require` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub module: String,
    pub version: String,
}

/// One `replace` directive.
///
/// Recorded for completeness; transitive replacements are not applied during
/// version selection, since only the main build file pins modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub from: String,
    pub from_version: Option<String>,
    pub to: String,
    pub to_version: Option<String>,
}

/// The parsed subset of a go.mod manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFile {
    pub module: String,
    pub requires: Vec<Require>,
    pub replaces: Vec<Replace>,
}

/// Parse a manifest payload.
pub fn parse(content: &str) -> Result<ModFile, ModFileError> {
    let mut module = None;
    let mut requires = Vec::new();
    let mut replaces = Vec::new();
    // Directive whose block form (`require (` ... `)`) we are inside.
    let mut block: Option<&'static str> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(directive) = block {
            if line == ")" {
                block = None;
                continue;
            }
            match directive {
                "require" => requires.push(parse_require(line, idx + 1)?),
                "replace" => replaces.push(parse_replace(line, idx + 1)?),
                _ => {}
            }
            continue;
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };

        match keyword {
            "module" => {
                module = Some(rest.trim_matches('"').to_string());
            }
            "require" | "replace" | "exclude" | "retract" => {
                if rest == "(" {
                    block = Some(match keyword {
                        "require" => "require",
                        "replace" => "replace",
                        _ => "ignored",
                    });
                } else if keyword == "require" {
                    requires.push(parse_require(rest, idx + 1)?);
                } else if keyword == "replace" {
                    replaces.push(parse_replace(rest, idx + 1)?);
                }
            }
            // go / toolchain / anything newer: irrelevant to resolution.
            _ => {}
        }
    }

    Ok(ModFile {
        module: module.ok_or(ModFileError::MissingModule)?,
        requires,
        replaces,
    })
}

/// Strip a `//` comment. Module paths cannot contain `//`, so the first
/// occurrence always starts the comment.
fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_require(line: &str, lineno: usize) -> Result<Require, ModFileError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(module), Some(version), None) => Ok(Require {
            module: module.trim_matches('"').to_string(),
            version: version.to_string(),
        }),
        _ => Err(ModFileError::Malformed {
            directive: "require",
            line: lineno,
            text: line.to_string(),
        }),
    }
}

fn parse_replace(line: &str, lineno: usize) -> Result<Replace, ModFileError> {
    let (lhs, rhs) = line.split_once("=>").ok_or_else(|| ModFileError::Malformed {
        directive: "replace",
        line: lineno,
        text: line.to_string(),
    })?;

    let mut lhs_parts = lhs.split_whitespace();
    let from = lhs_parts
        .next()
        .ok_or_else(|| ModFileError::Malformed {
            directive: "replace",
            line: lineno,
            text: line.to_string(),
        })?
        .trim_matches('"')
        .to_string();
    let from_version = lhs_parts.next().map(|s| s.to_string());

    let mut rhs_parts = rhs.split_whitespace();
    let to = rhs_parts
        .next()
        .ok_or_else(|| ModFileError::Malformed {
            directive: "replace",
            line: lineno,
            text: line.to_string(),
        })?
        .trim_matches('"')
        .to_string();
    let to_version = rhs_parts.next().map(|s| s.to_string());

    Ok(Replace {
        from,
        from_version,
        to,
        to_version,
    })
}
