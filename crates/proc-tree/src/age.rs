//! Age carry-over between consecutive polls.

use std::collections::BTreeMap;

use tracing::trace;

use crate::ProcessInfo;

/// Sets the age of every member of `current` from the `previous` poll.
///
/// Survivors (same logical process, see [`ProcessInfo::is_same_process`])
/// get the previous age plus one. Newcomers and reused pids start at 0.
/// Entries only present in `previous` are simply not carried.
pub fn carry_ages(previous: &BTreeMap<u32, ProcessInfo>, current: &mut BTreeMap<u32, ProcessInfo>) {
    for (pid, process) in current.iter_mut() {
        process.age = match previous.get(pid) {
            Some(old) if old.is_same_process(process) => old.age.saturating_add(1),
            Some(old) => {
                trace!(
                    pid,
                    old_start_time = ?old.start_time,
                    new_start_time = ?process.start_time,
                    "pid reused, resetting age"
                );
                0
            }
            None => 0,
        };
    }
}
