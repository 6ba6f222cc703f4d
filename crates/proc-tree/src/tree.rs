//! Immutable process-tree snapshots and their cumulative queries.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;
use std::time::Instant;

use crate::age::carry_ages;
use crate::builder::build_subtree;
use crate::Capabilities;
use crate::ProcessInfo;

const DUMP_HEADER: &str = "\t|- PID PPID PGRPID SESSID CMD_NAME USER_MODE_TIME(MILLIS) SYSTEM_TIME(MILLIS) VMEM_USAGE(BYTES) RSSMEM_USAGE(BYTES) FULL_CMD_LINE\n";

/// The subtree rooted at one pid, as seen by one poll.
///
/// A snapshot never changes once built; each poll produces a new one from
/// the previous via [`ProcessTree::refreshed`]. An empty tree means the root
/// is not alive (or the poll could not read anything) and every cumulative
/// query on it returns 0.
#[derive(Debug, Clone)]
pub struct ProcessTree {
    root_pid: u32,
    members: BTreeMap<u32, ProcessInfo>,
    capabilities: Capabilities,
    ticks_per_second: Option<u64>,
    taken_at: Instant,
}

impl ProcessTree {
    /// Creates a snapshot from already aged members.
    pub fn new(
        root_pid: u32,
        members: BTreeMap<u32, ProcessInfo>,
        capabilities: Capabilities,
        ticks_per_second: Option<u64>,
    ) -> Self {
        Self {
            root_pid,
            members,
            capabilities,
            ticks_per_second,
            taken_at: Instant::now(),
        }
    }

    /// Creates a snapshot with no members.
    pub fn empty(root_pid: u32, capabilities: Capabilities, ticks_per_second: Option<u64>) -> Self {
        Self::new(root_pid, BTreeMap::new(), capabilities, ticks_per_second)
    }

    /// Builds the next snapshot from every process of a new poll.
    ///
    /// Keeps the subtree of [`Self::root_pid`] and carries ages over from `self`.
    pub fn refreshed(
        &self,
        processes: impl IntoIterator<Item = ProcessInfo>,
        capabilities: Capabilities,
        ticks_per_second: Option<u64>,
    ) -> Self {
        let mut members = build_subtree(self.root_pid, processes);
        carry_ages(&self.members, &mut members);
        Self::new(self.root_pid, members, capabilities, ticks_per_second)
    }

    /// Overrides the snapshot instant.
    pub fn with_taken_at(mut self, taken_at: Instant) -> Self {
        self.taken_at = taken_at;
        self
    }

    pub fn root_pid(&self) -> u32 {
        self.root_pid
    }

    pub fn members(&self) -> &BTreeMap<u32, ProcessInfo> {
        &self.members
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessInfo> {
        self.members.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.members.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Pids of all members in ascending order.
    pub fn current_pids(&self) -> Vec<u32> {
        self.members.keys().copied().collect()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn ticks_per_second(&self) -> Option<u64> {
        self.ticks_per_second
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// Virtual memory in bytes of the members older than `older_than_age`.
    ///
    /// `0` includes every member, brand-new processes too.
    pub fn cumulative_vmem(&self, older_than_age: u32) -> u64 {
        self.sum_older_than(older_than_age, |p| p.virtual_memory_bytes)
    }

    /// Resident memory in bytes of the members older than `older_than_age`.
    ///
    /// 0 when the source cannot account resident memory.
    pub fn cumulative_rssmem(&self, older_than_age: u32) -> u64 {
        if !self.capabilities.resident_memory {
            return 0;
        }
        self.sum_older_than(older_than_age, |p| p.resident_memory_bytes)
    }

    /// CPU time consumed by the current members since each of them started.
    ///
    /// Members that exited take their CPU time with them; callers that need
    /// a running total must accumulate it themselves. Zero when the source
    /// has no tick rate.
    pub fn cumulative_cpu_time(&self) -> Duration {
        if !self.capabilities.cpu_time {
            return Duration::ZERO;
        }
        let ticks = self
            .members
            .values()
            .fold(0u64, |total, p| total.saturating_add(p.cumulative_cpu_ticks()));
        self.ticks_to_duration(ticks)
    }

    /// Whether the root is alive and leads its own process group.
    pub fn check_pid_pgrpid_for_match(&self) -> bool {
        self.members
            .get(&self.root_pid)
            .is_some_and(|root| root.process_group_id == root.pid)
    }

    /// CPU usage between `previous` and this snapshot, in percent of one CPU.
    ///
    /// Members that are new since `previous` count with all their ticks.
    /// `None` without a tick rate or when no time elapsed.
    pub fn cpu_usage_percent(&self, previous: &ProcessTree) -> Option<f64> {
        if !self.capabilities.cpu_time {
            return None;
        }
        let ticks_per_second = self.ticks_per_second?;
        let elapsed = self.taken_at.checked_duration_since(previous.taken_at)?;
        if elapsed.is_zero() {
            return None;
        }

        let ticks = self.members.values().fold(0u64, |total, process| {
            let consumed = match previous.members.get(&process.pid) {
                Some(old) if old.is_same_process(process) => process
                    .cumulative_cpu_ticks()
                    .saturating_sub(old.cumulative_cpu_ticks()),
                _ => process.cumulative_cpu_ticks(),
            };
            total.saturating_add(consumed)
        });

        let cpu_seconds = ticks as f64 / ticks_per_second as f64;
        Some(cpu_seconds / elapsed.as_secs_f64() * 100.0)
    }

    /// Human-readable listing of every member, one per line.
    pub fn dump(&self) -> String {
        let mut out = String::from(DUMP_HEADER);
        for p in self.members.values() {
            let _ = writeln!(
                out,
                "\t|- {} {} {} {} ({}) {} {} {} {} {}",
                p.pid,
                p.parent_pid,
                p.process_group_id,
                p.session_id,
                p.name,
                self.ticks_to_duration(p.user_ticks).as_millis(),
                self.ticks_to_duration(p.system_ticks).as_millis(),
                p.virtual_memory_bytes,
                p.resident_memory_bytes,
                p.command_line,
            );
        }
        out
    }

    fn sum_older_than(&self, older_than_age: u32, metric: impl Fn(&ProcessInfo) -> u64) -> u64 {
        self.members
            .values()
            .filter(|p| older_than_age == 0 || p.age > older_than_age)
            .fold(0u64, |total, p| total.saturating_add(metric(p)))
    }

    fn ticks_to_duration(&self, ticks: u64) -> Duration {
        match self.ticks_per_second {
            Some(rate) if rate > 0 => {
                let whole = Duration::from_secs(ticks / rate);
                let rest = (ticks % rate) as u128 * 1_000_000_000 / rate as u128;
                whole + Duration::from_nanos(rest as u64)
            }
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for ProcessTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[ ")?;
        for pid in self.members.keys() {
            write!(f, "{pid} ")?;
        }
        f.write_str("]")
    }
}
