//! Linux `/proc` snapshot reader.
//!
//! Every numeric directory under the proc root is a process. Its `stat` file
//! carries everything the tree needs; `cmdline` is read for diagnostics only.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;
use tracing::trace;

use super::SnapshotReader;
use crate::calculator::ReaderBackedTree;
use crate::ProcTreeError;
use crate::ProcessInfo;
use crate::Result;
use crate::TreeConfig;

// Field positions in /proc/<pid>/stat, counted after the closing ')'.
const STAT_PPID: usize = 1;
const STAT_PGRP: usize = 2;
const STAT_SESSION: usize = 3;
const STAT_UTIME: usize = 11;
const STAT_STIME: usize = 12;
const STAT_STARTTIME: usize = 19;
const STAT_VSIZE: usize = 20;
const STAT_RSS: usize = 21;

/// Process tree backed by the proc filesystem.
pub type ProcfsTree = ReaderBackedTree<ProcfsReader>;

/// Reads process state from a proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcfsReader {
    procfs_dir: PathBuf,
    page_size: Option<u64>,
    ticks_per_second: Option<u64>,
    read_retries: u32,
}

impl ProcfsReader {
    /// Creates a reader from `config`, asking the OS for any unset unit.
    ///
    /// An OS that cannot report its page size or tick rate leaves the
    /// matching capability disabled instead of failing.
    ///
    /// # Errors
    ///
    /// - [`ProcTreeError::InvalidConfiguration`] if `config` fails validation
    pub fn new(config: &TreeConfig) -> Result<Self, ProcTreeError> {
        config.validate()?;

        let page_size = config.page_size.or_else(system_page_size);
        let ticks_per_second = config.clock_ticks_per_second.or_else(system_clock_ticks);
        debug!(
            procfs_dir = %config.procfs_dir.display(),
            ?page_size,
            ?ticks_per_second,
            "Created procfs reader"
        );

        Ok(Self {
            procfs_dir: config.procfs_dir.clone(),
            page_size,
            ticks_per_second,
            read_retries: config.read_retries,
        })
    }

    pub fn procfs_dir(&self) -> &Path {
        &self.procfs_dir
    }

    pub fn page_size(&self) -> Option<u64> {
        self.page_size
    }

    /// Lists the pids currently present under the proc root.
    ///
    /// # Errors
    ///
    /// - [`ProcTreeError::ProcfsUnavailable`] if the directory cannot be listed
    pub fn list_pids(&self) -> Result<Vec<u32>, ProcTreeError> {
        let entries = fs::read_dir(&self.procfs_dir).map_err(|e| {
            Report::new(ProcTreeError::ProcfsUnavailable {
                path: self.procfs_dir.clone(),
                reason: e.to_string(),
            })
        })?;

        let mut pids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };

            let file_name = entry.file_name();
            let pid = match file_name.to_str().map(str::parse::<u32>) {
                Some(Ok(pid)) => pid,
                _ => continue,
            };
            pids.push(pid);
        }

        Ok(pids)
    }

    /// Reads one process, retrying transient failures up to `read_retries` times.
    ///
    /// # Errors
    ///
    /// The last error of [`Self::read_process`] once retries are exhausted, or
    /// the first non-transient one.
    pub fn read_process_with_retries(&self, pid: u32) -> Result<ProcessInfo, ProcTreeError> {
        retry_transient(pid, self.read_retries, || self.read_process(pid))
    }

    /// Reads one process without retrying.
    ///
    /// # Errors
    ///
    /// - [`ProcTreeError::ProcessGone`] if the process no longer exists
    /// - [`ProcTreeError::AccessDenied`] if its `stat` may not be read
    /// - [`ProcTreeError::ProcessUnreadable`] if its `stat` cannot be read
    /// - [`ProcTreeError::Parse`] if its `stat` is malformed
    pub fn read_process(&self, pid: u32) -> Result<ProcessInfo, ProcTreeError> {
        let process_dir = self.procfs_dir.join(pid.to_string());

        let stat = fs::read(process_dir.join("stat")).map_err(|e| classify_read_error(pid, e))?;
        let stat = String::from_utf8_lossy(&stat);
        let mut info = Self::parse_stat(pid, &stat, self.page_size)
            .attach_printable_lazy(|| format!("stat file under {}", process_dir.display()))?;

        // cmdline is empty for kernel threads and zombies; a failed read is not worth a retry.
        if let Ok(raw) = fs::read(process_dir.join("cmdline")) {
            info.command_line = Self::parse_command_line(&raw);
        }

        Ok(info)
    }

    /// Parses the contents of `/proc/<pid>/stat`.
    ///
    /// The command name sits between the first `(` and the last `)` and may
    /// itself contain spaces and parentheses.
    ///
    /// # Errors
    ///
    /// - [`ProcTreeError::Parse`] if the line is truncated or a field is not numeric
    pub fn parse_stat(
        pid: u32,
        content: &str,
        page_size: Option<u64>,
    ) -> Result<ProcessInfo, ProcTreeError> {
        let (open, close) = match (content.find('('), content.rfind(')')) {
            (Some(open), Some(close)) if open < close => (open, close),
            _ => {
                return Err(Report::new(ProcTreeError::parse(
                    pid,
                    "command name is not enclosed in parentheses",
                )))
            }
        };

        let stat_pid: u32 = content[..open].trim().parse().map_err(|e| {
            Report::new(ProcTreeError::parse(pid, format!("invalid pid field: {e}")))
        })?;
        if stat_pid != pid {
            return Err(Report::new(ProcTreeError::parse(
                pid,
                format!("stat belongs to pid {stat_pid}"),
            )));
        }

        let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
        if fields.len() <= STAT_RSS {
            return Err(Report::new(ProcTreeError::parse(
                pid,
                format!("expected at least {} fields, found {}", STAT_RSS + 1, fields.len()),
            )));
        }

        let rss_pages: u64 = stat_field(pid, &fields, STAT_RSS, "rss")?;

        Ok(ProcessInfo {
            pid,
            parent_pid: stat_field(pid, &fields, STAT_PPID, "ppid")?,
            process_group_id: stat_field(pid, &fields, STAT_PGRP, "pgrp")?,
            session_id: stat_field(pid, &fields, STAT_SESSION, "session")?,
            name: content[open + 1..close].to_string(),
            command_line: String::new(),
            virtual_memory_bytes: stat_field(pid, &fields, STAT_VSIZE, "vsize")?,
            resident_memory_bytes: page_size.map_or(0, |size| rss_pages.saturating_mul(size)),
            user_ticks: stat_field(pid, &fields, STAT_UTIME, "utime")?,
            system_ticks: stat_field(pid, &fields, STAT_STIME, "stime")?,
            start_time: Some(stat_field(pid, &fields, STAT_STARTTIME, "starttime")?),
            age: 0,
        })
    }

    /// Joins the NUL-separated arguments of `/proc/<pid>/cmdline`.
    pub fn parse_command_line(raw: &[u8]) -> String {
        raw.split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl SnapshotReader for ProcfsReader {
    #[tracing::instrument(level = "trace", skip(self), fields(procfs_dir = %self.procfs_dir.display()))]
    fn read_processes(&self) -> Result<Vec<ProcessInfo>, ProcTreeError> {
        let pids = self.list_pids()?;
        collect_processes(&self.procfs_dir, pids, |pid| {
            self.read_process_with_retries(pid)
        })
    }

    fn ticks_per_second(&self) -> Option<u64> {
        self.ticks_per_second
    }

    fn supports_resident_memory(&self) -> bool {
        self.page_size.is_some()
    }
}

impl ProcfsTree {
    /// Creates a procfs-backed tree for `root_pid`.
    ///
    /// # Errors
    ///
    /// - [`ProcTreeError::InvalidConfiguration`] if `config` fails validation
    pub fn from_config(root_pid: u32, config: &TreeConfig) -> Result<Self, ProcTreeError> {
        Ok(Self::new(root_pid, ProcfsReader::new(config)?))
    }
}

/// Runs `read` until it succeeds, fails for good, or `retries` extra attempts
/// are spent on transient errors.
fn retry_transient<T>(
    pid: u32,
    retries: u32,
    mut read: impl FnMut() -> Result<T, ProcTreeError>,
) -> Result<T, ProcTreeError> {
    let mut attempt = 0;
    loop {
        match read() {
            Ok(value) => return Ok(value),
            Err(report) if report.current_context().is_transient() && attempt < retries => {
                attempt += 1;
                trace!(pid, attempt, error = ?report, "Retrying process read");
            }
            Err(report) => return Err(report),
        }
    }
}

/// Reads every listed pid, skipping the ones that cannot be read.
///
/// # Errors
///
/// - [`ProcTreeError::ProcfsUnavailable`] if entries were listed but every
///   one of them was denied
fn collect_processes(
    procfs_dir: &Path,
    pids: Vec<u32>,
    read: impl Fn(u32) -> Result<ProcessInfo, ProcTreeError>,
) -> Result<Vec<ProcessInfo>, ProcTreeError> {
    let mut processes = Vec::with_capacity(pids.len());
    let mut denied = 0usize;

    for pid in pids {
        match read(pid) {
            Ok(info) => processes.push(info),
            Err(report) => match report.current_context() {
                ProcTreeError::ProcessGone { .. } => {
                    trace!(pid, "Process exited during scan");
                }
                ProcTreeError::AccessDenied { .. } => {
                    denied += 1;
                    debug!(pid, error = ?report, "Skipping process without read permission");
                }
                _ => {
                    debug!(pid, error = ?report, "Skipping unreadable process");
                }
            },
        }
    }

    if processes.is_empty() && denied > 0 {
        return Err(Report::new(ProcTreeError::ProcfsUnavailable {
            path: procfs_dir.to_path_buf(),
            reason: format!("permission denied for all {denied} listed processes"),
        }));
    }

    debug!(
        found_processes = processes.len(),
        denied_processes = denied,
        "Completed proc filesystem scan"
    );
    Ok(processes)
}

fn stat_field<T>(pid: u32, fields: &[&str], index: usize, label: &str) -> Result<T, ProcTreeError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    fields[index].parse().map_err(|e| {
        Report::new(ProcTreeError::parse(
            pid,
            format!("invalid {label} field {:?}: {e}", fields[index]),
        ))
    })
}

fn classify_read_error(pid: u32, error: io::Error) -> Report<ProcTreeError> {
    let gone = error.kind() == io::ErrorKind::NotFound || error.raw_os_error() == Some(libc::ESRCH);

    if gone {
        Report::new(ProcTreeError::ProcessGone { pid })
    } else if error.kind() == io::ErrorKind::PermissionDenied {
        Report::new(ProcTreeError::AccessDenied {
            pid,
            reason: error.to_string(),
        })
    } else {
        Report::new(ProcTreeError::ProcessUnreadable {
            pid,
            reason: error.to_string(),
        })
    }
}

#[cfg(unix)]
fn sysconf(name: libc::c_int) -> Option<u64> {
    // SAFETY: sysconf only reads system constants.
    let value = unsafe { libc::sysconf(name) };
    u64::try_from(value).ok().filter(|value| *value > 0)
}

#[cfg(unix)]
fn system_page_size() -> Option<u64> {
    sysconf(libc::_SC_PAGESIZE)
}

#[cfg(unix)]
fn system_clock_ticks() -> Option<u64> {
    sysconf(libc::_SC_CLK_TCK)
}

#[cfg(not(unix))]
fn system_page_size() -> Option<u64> {
    None
}

#[cfg(not(unix))]
fn system_clock_ticks() -> Option<u64> {
    None
}
