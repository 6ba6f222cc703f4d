//! Subtree reconstruction from parent-pid links.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use crate::ProcessInfo;

/// Returns the processes reachable from `root_pid` by parent→child edges.
///
/// The snapshot comes from non-atomic OS reads, so the parent graph may hold
/// cycles or self-parented entries; every pid is visited at most once. An
/// absent root yields an empty map.
pub fn build_subtree(
    root_pid: u32,
    processes: impl IntoIterator<Item = ProcessInfo>,
) -> BTreeMap<u32, ProcessInfo> {
    let mut all: HashMap<u32, ProcessInfo> = HashMap::new();
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();

    for process in processes {
        children
            .entry(process.parent_pid)
            .or_default()
            .push(process.pid);
        all.insert(process.pid, process);
    }

    let mut subtree = BTreeMap::new();
    if !all.contains_key(&root_pid) {
        return subtree;
    }

    let mut visited = HashSet::from([root_pid]);
    let mut queue = VecDeque::from([root_pid]);

    while let Some(pid) = queue.pop_front() {
        if let Some(child_pids) = children.get(&pid) {
            for &child in child_pids {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        if let Some(process) = all.remove(&pid) {
            subtree.insert(pid, process);
        }
    }

    subtree
}
