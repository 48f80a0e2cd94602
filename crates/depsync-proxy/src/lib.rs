//! depsync Module Proxy Client
//!
//! Talks the Go module proxy protocol to discover which third-party module
//! owns an import path, fetch per-module go.mod manifests, download module
//! archives, and select a single consistent version for every transitively
//! required module.
//!
//! All lookups are cached on the [`ProxyClient`] instance for the lifetime
//! of a run, negative results included.

mod client;
mod modfile;
mod resolve;
pub mod version;

pub use client::{ProxyClient, ProxyError};
pub use modfile::{ModFile, ModFileError, Replace, Require};
pub use resolve::{resolve_deps, Module};
