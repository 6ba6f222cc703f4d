//! Long-lived per-root owners of the latest process tree snapshot.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::Capabilities;
use crate::ProcessTree;
use crate::SnapshotReader;

/// Resource accounting for the process tree of one root pid.
///
/// One instance serves one caller. `refresh` takes `&mut self`, so a
/// caller polling from several threads has to serialize through its own
/// lock; queries only touch the last published snapshot.
pub trait ResourceCalculatorTree: Send {
    /// Pid the tree is rooted at.
    fn root_pid(&self) -> u32;

    /// Polls the OS and publishes a new snapshot.
    ///
    /// Every member that survives from the previous poll ages by one. If
    /// the root is not alive the new snapshot is empty.
    fn refresh(&mut self) -> Arc<ProcessTree>;

    /// Latest published snapshot, empty before the first refresh.
    fn snapshot(&self) -> Arc<ProcessTree>;

    /// Snapshot published by the refresh before the latest one.
    fn previous_snapshot(&self) -> Option<Arc<ProcessTree>>;

    /// Metrics this implementation can account.
    fn capabilities(&self) -> Capabilities;

    fn process_tree_dump(&self) -> String {
        self.snapshot().dump()
    }

    fn cumulative_vmem(&self, older_than_age: u32) -> u64 {
        self.snapshot().cumulative_vmem(older_than_age)
    }

    fn cumulative_rssmem(&self, older_than_age: u32) -> u64 {
        self.snapshot().cumulative_rssmem(older_than_age)
    }

    fn cumulative_cpu_time(&self) -> Duration {
        self.snapshot().cumulative_cpu_time()
    }

    fn check_pid_pgrpid_for_match(&self) -> bool {
        self.snapshot().check_pid_pgrpid_for_match()
    }

    /// CPU usage over the last refresh interval, in percent of one CPU.
    fn cpu_usage_percent(&self) -> Option<f64> {
        let previous = self.previous_snapshot()?;
        self.snapshot().cpu_usage_percent(&previous)
    }
}

/// [`ResourceCalculatorTree`] over any [`SnapshotReader`].
#[derive(Debug)]
pub struct ReaderBackedTree<R> {
    root_pid: u32,
    reader: R,
    current: Arc<ProcessTree>,
    previous: Option<Arc<ProcessTree>>,
    /// Last successfully read snapshot, the age reference for the next poll.
    baseline: Arc<ProcessTree>,
    refreshes: u64,
}

impl<R: SnapshotReader> ReaderBackedTree<R> {
    pub fn new(root_pid: u32, reader: R) -> Self {
        let current = Arc::new(ProcessTree::empty(
            root_pid,
            reader.capabilities(),
            reader.ticks_per_second(),
        ));
        Self {
            root_pid,
            reader,
            baseline: Arc::clone(&current),
            current,
            previous: None,
            refreshes: 0,
        }
    }

    /// Number of completed refreshes.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}

impl<R: SnapshotReader> ResourceCalculatorTree for ReaderBackedTree<R> {
    fn root_pid(&self) -> u32 {
        self.root_pid
    }

    #[tracing::instrument(level = "debug", skip(self), fields(root_pid = self.root_pid))]
    fn refresh(&mut self) -> Arc<ProcessTree> {
        let capabilities = self.reader.capabilities();
        let ticks_per_second = self.reader.ticks_per_second();

        let next = match self.reader.read_processes() {
            Ok(processes) => {
                let next = Arc::new(self.baseline.refreshed(
                    processes,
                    capabilities,
                    ticks_per_second,
                ));
                self.baseline = Arc::clone(&next);
                next
            }
            Err(report) => {
                // Not sticky: the next refresh reads the source again and ages
                // survivors against the last successful read.
                warn!(error = ?report, "Cannot read process information, accounting an empty tree");
                Arc::new(ProcessTree::empty(self.root_pid, capabilities, ticks_per_second))
            }
        };
        debug!(members = next.len(), "Refreshed process tree");

        // The placeholder published before the first poll is not a previous snapshot.
        let replaced = std::mem::replace(&mut self.current, Arc::clone(&next));
        if self.refreshes > 0 {
            self.previous = Some(replaced);
        }
        self.refreshes += 1;
        next
    }

    fn snapshot(&self) -> Arc<ProcessTree> {
        Arc::clone(&self.current)
    }

    fn previous_snapshot(&self) -> Option<Arc<ProcessTree>> {
        self.previous.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.reader.capabilities()
    }
}
