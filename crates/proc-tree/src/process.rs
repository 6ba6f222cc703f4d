//! Per-process state as read from the OS.

/// One process at one snapshot instant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessInfo {
    /// Process ID, reusable by the OS once the process exits
    pub pid: u32,
    /// Parent process ID at snapshot time
    pub parent_pid: u32,
    /// Process group ID
    pub process_group_id: u32,
    /// Session ID
    pub session_id: u32,
    /// Command name
    pub name: String,
    /// Full command line, empty when unreadable
    pub command_line: String,
    /// Virtual memory size in bytes
    pub virtual_memory_bytes: u64,
    /// Resident set size in bytes, 0 when the source cannot account it
    pub resident_memory_bytes: u64,
    /// CPU ticks spent in user mode
    pub user_ticks: u64,
    /// CPU ticks spent in kernel mode
    pub system_ticks: u64,
    /// Start time used to tell a reused pid apart, `None` when unknown
    pub start_time: Option<u64>,
    /// Consecutive polls this process has been observed, 0 on first sight
    pub age: u32,
}

impl ProcessInfo {
    pub fn new(pid: u32, parent_pid: u32) -> Self {
        Self {
            pid,
            parent_pid,
            ..Default::default()
        }
    }

    /// Total CPU ticks consumed by this process alone.
    pub fn cumulative_cpu_ticks(&self) -> u64 {
        self.user_ticks.saturating_add(self.system_ticks)
    }

    /// Whether `other` is the same logical process observed at another poll.
    ///
    /// Identity is the pid plus the start time. When neither observation
    /// carries a start time the pid alone decides; a start time present on
    /// only one side counts as a different process.
    pub fn is_same_process(&self, other: &ProcessInfo) -> bool {
        self.pid == other.pid && self.start_time == other.start_time
    }

    pub fn with_group(mut self, process_group_id: u32, session_id: u32) -> Self {
        self.process_group_id = process_group_id;
        self.session_id = session_id;
        self
    }

    pub fn with_memory(mut self, virtual_memory_bytes: u64, resident_memory_bytes: u64) -> Self {
        self.virtual_memory_bytes = virtual_memory_bytes;
        self.resident_memory_bytes = resident_memory_bytes;
        self
    }

    pub fn with_cpu_ticks(mut self, user_ticks: u64, system_ticks: u64) -> Self {
        self.user_ticks = user_ticks;
        self.system_ticks = system_ticks;
        self
    }

    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
