//! Error taxonomy for bundling, validation and deployment
//!
//! Every variant names the concrete path, reference or deadline involved so the
//! message can be shown to the user as-is.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    /// A require chain loops back on a module that is still being resolved
    #[error("circular dependency detected involving: {}", .path.display())]
    Cycle { path: PathBuf },

    #[error("cannot resolve require('{reference}') from {}: module not found", .requester.display())]
    Unresolved {
        reference: String,
        requester: PathBuf,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "{operation} timed out after {} seconds. This usually indicates:\n\
         1. Circular dependency loop\n\
         2. Very large project (try splitting into smaller modules)\n\
         3. Invalid require() paths causing infinite resolution\n\
         Check your dependencies for cycles and fix require() paths.",
        .limit.as_secs()
    )]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("syntax error in {}:\n{diagnostics}", .path.display())]
    Syntax { path: PathBuf, diagnostics: String },

    #[error("entry file not found: {}", .path.display())]
    EntryNotFound { path: PathBuf },

    #[error("no Main.lua found in project directory {}", .dir.display())]
    NoEntryFile { dir: PathBuf },

    #[error("Lua compiler not found. Install Lua 5.4+ from https://luabinaries.sourceforge.net/")]
    CompilerNotFound,

    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

impl BundleError {
    /// Whether the failure came from the deadline rather than the module graph
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
