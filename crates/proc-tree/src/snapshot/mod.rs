//! Process snapshot sources.

pub mod procfs;

use crate::ProcTreeError;
use crate::ProcessInfo;
use crate::Result;

/// Metrics a snapshot source is able to account.
///
/// Cumulative queries return 0 for unsupported metrics; this is how a caller
/// tells "zero" apart from "unsupported".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub resident_memory: bool,
    pub cpu_time: bool,
}

/// Reads the state of every process visible to the OS.
pub trait SnapshotReader: Send + Sync {
    /// Reads all processes that are still alive when their entry is read.
    ///
    /// Processes that exit mid-scan are left out of the result.
    ///
    /// # Errors
    ///
    /// Only when the source as a whole cannot be read, e.g.
    /// [`ProcTreeError::ProcfsUnavailable`].
    fn read_processes(&self) -> Result<Vec<ProcessInfo>, ProcTreeError>;

    /// Rate of the tick counters in [`ProcessInfo`], `None` if unknown.
    fn ticks_per_second(&self) -> Option<u64>;

    /// Whether [`ProcessInfo::resident_memory_bytes`] is meaningful.
    fn supports_resident_memory(&self) -> bool {
        true
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            resident_memory: self.supports_resident_memory(),
            cpu_time: self.ticks_per_second().is_some(),
        }
    }
}
