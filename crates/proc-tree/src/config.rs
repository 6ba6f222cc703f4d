//! tree config
//!
//! Parametrizes a concrete tree implementation. The surrounding system owns
//! where this comes from; the crate only consumes it.

use std::path::PathBuf;

use error_stack::Report;
use serde::Deserialize;

use crate::ProcTreeError;
use crate::Result;

/// Configuration for a process tree implementation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeConfig {
    /// root of the proc filesystem
    pub procfs_dir: PathBuf,
    /// page size in bytes, queried from the OS when unset
    pub page_size: Option<u64>,
    /// clock ticks per second, queried from the OS when unset
    pub clock_ticks_per_second: Option<u64>,
    /// extra attempts for a transiently unreadable process entry
    pub read_retries: u32,
    /// registered implementation name, platform default when unset
    pub implementation: Option<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            procfs_dir: PathBuf::from("/proc"),
            page_size: None,
            clock_ticks_per_second: None,
            read_retries: 2,
            implementation: None,
        }
    }
}

impl TreeConfig {
    /// set proc filesystem root.
    pub fn with_procfs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.procfs_dir = dir.into();
        self
    }

    /// set page size.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// set clock tick rate.
    pub fn with_clock_ticks_per_second(mut self, ticks: u64) -> Self {
        self.clock_ticks_per_second = Some(ticks);
        self
    }

    /// set retry count.
    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    /// set implementation name.
    pub fn with_implementation(mut self, name: impl Into<String>) -> Self {
        self.implementation = Some(name.into());
        self
    }

    /// Rejects values no OS would report.
    ///
    /// # Errors
    ///
    /// - [`ProcTreeError::InvalidConfiguration`] for a zero page size or tick rate,
    ///   or an empty procfs path
    pub fn validate(&self) -> Result<(), ProcTreeError> {
        if self.page_size == Some(0) {
            return Err(Report::new(ProcTreeError::invalid_config(
                "pageSize must be greater than zero",
            )));
        }
        if self.clock_ticks_per_second == Some(0) {
            return Err(Report::new(ProcTreeError::invalid_config(
                "clockTicksPerSecond must be greater than zero",
            )));
        }
        if self.procfs_dir.as_os_str().is_empty() {
            return Err(Report::new(ProcTreeError::invalid_config(
                "procfsDir must not be empty",
            )));
        }
        Ok(())
    }
}
