//! Error types for process-tree accounting.

use core::error::Error;
use std::path::PathBuf;

use derive_more::Display;

/// Errors raised while reading process state or configuring a reader.
///
/// None of these escape a refresh: the calculator logs them and degrades to
/// an empty tree. They surface directly only from constructors.
#[derive(Debug, Display)]
pub enum ProcTreeError {
    /// The process information source cannot be read at all
    #[display("Process information source {path:?} is unavailable: {reason}")]
    ProcfsUnavailable { path: PathBuf, reason: String },

    /// A single process entry could not be read
    #[display("Cannot read process {pid}: {reason}")]
    ProcessUnreadable { pid: u32, reason: String },

    /// The process entry exists but this process may not read it
    #[display("Permission denied reading process {pid}: {reason}")]
    AccessDenied { pid: u32, reason: String },

    /// The process exited between listing and reading
    #[display("Process {pid} is gone")]
    ProcessGone { pid: u32 },

    /// A process entry was read but its contents are malformed
    #[display("Cannot parse process {pid}: {message}")]
    Parse { pid: u32, message: String },

    /// Configuration is invalid or inconsistent
    #[display("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl Error for ProcTreeError {}

impl ProcTreeError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn parse(pid: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            pid,
            message: message.into(),
        }
    }

    /// Whether a retry could succeed. Vanished processes never come back and
    /// permissions do not change between attempts.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProcessUnreadable { .. } | Self::Parse { .. })
    }
}
