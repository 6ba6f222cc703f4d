use std::fs;
use std::path::Path;
use std::time::Duration;

use proc_tree::create_process_tree;
use proc_tree::Platform;
use proc_tree::ProcfsTree;
use proc_tree::ResourceCalculatorTree;
use proc_tree::TreeConfig;
use proc_tree::TreeRegistry;
use similar_asserts::assert_eq;
use tempfile::TempDir;
use test_log::test;

/// A proc filesystem laid out on disk, one `<pid>/stat` per process.
struct FakeProcfs {
    dir: TempDir,
}

/// Fields of a fake process that the tree cares about.
#[derive(Clone, Copy)]
struct FakeProcess {
    pid: u32,
    ppid: u32,
    pgrp: u32,
    start_time: u64,
    vmem: u64,
    rss_pages: u64,
    utime: u64,
    stime: u64,
}

impl FakeProcess {
    fn new(pid: u32, ppid: u32) -> Self {
        Self {
            pid,
            ppid,
            pgrp: ppid,
            start_time: u64::from(pid) * 10,
            vmem: 1_000,
            rss_pages: 1,
            utime: 10,
            stime: 0,
        }
    }

    fn leader(mut self) -> Self {
        self.pgrp = self.pid;
        self
    }

    fn started_at(mut self, start_time: u64) -> Self {
        self.start_time = start_time;
        self
    }

    fn vmem(mut self, vmem: u64) -> Self {
        self.vmem = vmem;
        self
    }

    fn stat_line(&self) -> String {
        format!(
            "{pid} (proc {pid}) S {ppid} {pgrp} {pgrp} 0 -1 4194560 0 0 0 0 {utime} {stime} 0 0 20 0 1 0 {start} {vmem} {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
            pid = self.pid,
            ppid = self.ppid,
            pgrp = self.pgrp,
            utime = self.utime,
            stime = self.stime,
            start = self.start_time,
            vmem = self.vmem,
            rss = self.rss_pages,
        )
    }
}

impl FakeProcfs {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("should create temp dir"),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn spawn(&self, process: FakeProcess) {
        let process_dir = self.path().join(process.pid.to_string());
        fs::create_dir_all(&process_dir).unwrap();
        fs::write(process_dir.join("stat"), process.stat_line()).unwrap();
        fs::write(
            process_dir.join("cmdline"),
            format!("/bin/proc-{}\0--flag\0", process.pid),
        )
        .unwrap();
    }

    fn kill(&self, pid: u32) {
        fs::remove_dir_all(self.path().join(pid.to_string())).unwrap();
    }

    fn config(&self) -> TreeConfig {
        TreeConfig::default()
            .with_procfs_dir(self.path())
            .with_page_size(4096)
            .with_clock_ticks_per_second(100)
    }

    fn tree(&self, root_pid: u32) -> ProcfsTree {
        ProcfsTree::from_config(root_pid, &self.config()).expect("should create tree")
    }
}

fn ages(tree: &dyn ResourceCalculatorTree) -> Vec<(u32, u32)> {
    tree.snapshot()
        .members()
        .values()
        .map(|p| (p.pid, p.age))
        .collect()
}

#[test]
fn dead_root_yields_empty_tree() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(1, 0).leader());
    let mut tree = procfs.tree(4242);

    let snapshot = tree.refresh();

    assert!(snapshot.is_empty());
    for age in [0, 1, 10] {
        assert_eq!(tree.cumulative_vmem(age), 0);
        assert_eq!(tree.cumulative_rssmem(age), 0);
    }
    assert_eq!(tree.cumulative_cpu_time(), Duration::ZERO);
    assert!(!tree.check_pid_pgrpid_for_match());
}

#[test]
fn ages_grow_by_one_per_refresh() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(1, 0).leader());
    procfs.spawn(FakeProcess::new(100, 1).leader());
    procfs.spawn(FakeProcess::new(101, 100));
    let mut tree = procfs.tree(100);

    for _ in 0..4 {
        tree.refresh();
    }
    procfs.spawn(FakeProcess::new(102, 101));
    tree.refresh();

    assert_eq!(ages(&tree), vec![(100, 4), (101, 4), (102, 0)]);
}

#[test]
fn reused_pid_starts_over() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(100, 1).leader());
    procfs.spawn(FakeProcess::new(101, 100).started_at(500));
    procfs.spawn(FakeProcess::new(102, 100).started_at(600));
    let mut tree = procfs.tree(100);
    tree.refresh();
    tree.refresh();

    // 101 is replaced between polls, 102 disappears for one poll.
    procfs.kill(101);
    procfs.spawn(FakeProcess::new(101, 100).started_at(900));
    procfs.kill(102);
    tree.refresh();
    procfs.spawn(FakeProcess::new(102, 100).started_at(600));
    tree.refresh();

    assert_eq!(ages(&tree), vec![(100, 3), (101, 1), (102, 0)]);
}

#[test]
fn subtree_excludes_siblings_and_orphans() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(1, 0).leader());
    procfs.spawn(FakeProcess::new(100, 1).leader());
    procfs.spawn(FakeProcess::new(101, 100));
    procfs.spawn(FakeProcess::new(102, 101));
    procfs.spawn(FakeProcess::new(200, 1).leader());
    procfs.spawn(FakeProcess::new(300, 1));
    let mut tree = procfs.tree(100);

    let snapshot = tree.refresh();
    assert_eq!(snapshot.current_pids(), vec![100, 101, 102]);

    // 101 exits; 102 is reparented to init and leaves the tree.
    procfs.kill(101);
    procfs.spawn(FakeProcess::new(102, 1));
    let snapshot = tree.refresh();
    assert_eq!(snapshot.current_pids(), vec![100]);
}

#[test]
fn age_filtered_totals() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(100, 1).leader().vmem(1_000));
    let mut tree = procfs.tree(100);
    tree.refresh();
    procfs.spawn(FakeProcess::new(101, 100).vmem(2_000));
    tree.refresh();
    procfs.spawn(FakeProcess::new(102, 100).vmem(4_000));
    tree.refresh();
    procfs.spawn(FakeProcess::new(103, 100).vmem(8_000));
    tree.refresh();

    assert_eq!(ages(&tree), vec![(100, 3), (101, 2), (102, 1), (103, 0)]);
    assert_eq!(tree.cumulative_vmem(0), 15_000);
    assert_eq!(tree.cumulative_vmem(1), 3_000);
    assert_eq!(tree.cumulative_rssmem(0), 4 * 4096);
    assert_eq!(tree.cumulative_rssmem(2), 4096);
    // 4 processes x 10 ticks at 100 Hz
    assert_eq!(tree.cumulative_cpu_time(), Duration::from_millis(400));
}

#[test]
fn pgrp_check_follows_root() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(100, 1).leader());
    procfs.spawn(FakeProcess::new(200, 1));
    let mut leader = procfs.tree(100);
    let mut follower = procfs.tree(200);

    leader.refresh();
    follower.refresh();

    assert!(leader.check_pid_pgrpid_for_match());
    assert!(!follower.check_pid_pgrpid_for_match());

    procfs.kill(100);
    leader.refresh();
    assert!(!leader.check_pid_pgrpid_for_match());
}

#[test]
fn dump_contains_every_member() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(100, 1).leader());
    procfs.spawn(FakeProcess::new(101, 100));
    let mut tree = procfs.tree(100);
    tree.refresh();

    let dump = tree.process_tree_dump();

    assert_eq!(dump.lines().count(), 3);
    assert!(dump.contains("\t|- 101 100 100 100 (proc 101) 100 0 1000 4096 /bin/proc-101 --flag"));
}

#[test]
fn missing_procfs_recovers_on_next_refresh() {
    let procfs = FakeProcfs::new();
    let root = procfs.path().join("proc");
    let config = TreeConfig::default()
        .with_procfs_dir(&root)
        .with_page_size(4096)
        .with_clock_ticks_per_second(100);
    let mut tree = ProcfsTree::from_config(100, &config).unwrap();

    assert!(tree.refresh().is_empty());

    let process_dir = root.join("100");
    fs::create_dir_all(&process_dir).unwrap();
    fs::write(
        process_dir.join("stat"),
        FakeProcess::new(100, 1).leader().stat_line(),
    )
    .unwrap();

    assert_eq!(tree.refresh().current_pids(), vec![100]);
}

#[test]
fn cpu_usage_uses_previous_refresh() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(100, 1).leader());
    let mut tree = procfs.tree(100);

    tree.refresh();
    assert_eq!(tree.cpu_usage_percent(), None, "a single refresh has no interval");

    let busy = FakeProcess {
        utime: 60,
        ..FakeProcess::new(100, 1).leader()
    };
    procfs.spawn(busy);
    std::thread::sleep(Duration::from_millis(20));
    tree.refresh();

    let percent = tree.cpu_usage_percent().expect("two snapshots are available");
    assert!(percent > 0.0, "50 extra ticks should show up, got {percent}");
}

#[test]
fn registry_builds_configured_procfs_tree() {
    let procfs = FakeProcfs::new();
    procfs.spawn(FakeProcess::new(100, 1).leader());
    let config = procfs.config().with_implementation("procfs");

    let selection =
        TreeRegistry::default().create(100, None, &Platform::from_os_name("freebsd"), &config);

    let mut tree = selection.into_tree().expect("configured implementation");
    assert_eq!(tree.refresh().current_pids(), vec![100]);
}

#[test]
fn unsupported_platform_disables_accounting() {
    let selection = create_process_tree(
        100,
        None,
        &Platform::from_os_name("SunOS"),
        &TreeConfig::default(),
    );

    assert!(selection.into_tree().is_none());
}

#[cfg(target_os = "linux")]
mod live {
    use std::process::Command;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::create_process_tree;
    use super::Platform;
    use super::ProcfsTree;
    use super::ResourceCalculatorTree;
    use super::TreeConfig;

    #[test]
    fn tracks_current_process() {
        let pid = std::process::id();
        let mut tree = create_process_tree(pid, None, &Platform::detect(), &TreeConfig::default())
            .into_tree()
            .expect("linux should have a procfs tree");

        let snapshot = tree.refresh();

        assert!(snapshot.contains(pid));
        assert!(tree.cumulative_vmem(0) > 0);
        assert!(tree.capabilities().resident_memory);
        assert!(tree.cumulative_rssmem(0) > 0);
    }

    #[test]
    fn tracks_spawned_child() {
        let mut child = Command::new("sleep")
            .arg("5")
            .spawn()
            .expect("should spawn sleep");
        let child_pid = child.id();
        let mut tree = ProcfsTree::from_config(std::process::id(), &TreeConfig::default()).unwrap();

        let first = tree.refresh();
        let second = tree.refresh();

        child.kill().unwrap();
        child.wait().unwrap();

        assert!(first.contains(child_pid), "child should be in {first}");
        assert_eq!(second.get(child_pid).map(|p| p.age), Some(1));
    }
}
