//! Process-tree resource accounting.
//!
//! Given a root pid, this crate discovers the root's descendants, tracks how
//! many polls each of them has survived, and reports cumulative virtual
//! memory, resident memory and CPU time for the tree as a whole.
//!
//! # Key Components
//!
//! - [`SnapshotReader`]: reads per-process state from the OS ([`ProcfsReader`] on Linux)
//! - [`ProcessTree`]: immutable snapshot of one subtree with the cumulative queries
//! - [`ResourceCalculatorTree`]: long-lived owner that refreshes the snapshot on each poll
//! - [`TreeRegistry`] / [`create_process_tree`]: platform-aware construction
//!
//! # Examples
//!
//! ```rust,no_run
//! use proc_tree::{create_process_tree, Platform, TreeConfig, TreeSelection};
//!
//! let platform = Platform::detect();
//! let selection = create_process_tree(std::process::id(), None, &platform, &TreeConfig::default());
//!
//! if let TreeSelection::Tree(mut tree) = selection {
//!     let snapshot = tree.refresh();
//!     println!("{} processes, {} bytes vmem", snapshot.len(), snapshot.cumulative_vmem(0));
//! }
//! ```

use error_stack::Report;

mod age;
mod builder;
mod calculator;
mod config;
mod error;
mod factory;
mod process;
mod snapshot;
mod tree;

/// Result type using error-stack for context-rich error reporting
pub type Result<T, C> = core::result::Result<T, Report<C>>;

pub use age::carry_ages;
pub use builder::build_subtree;
pub use calculator::ReaderBackedTree;
pub use calculator::ResourceCalculatorTree;
pub use config::TreeConfig;
pub use error::ProcTreeError;
pub use factory::create_process_tree;
pub use factory::Platform;
pub use factory::TreeConstructor;
pub use factory::TreeRegistry;
pub use factory::TreeSelection;
pub use factory::PROCFS_IMPLEMENTATION;
pub use process::ProcessInfo;
pub use snapshot::procfs::ProcfsReader;
pub use snapshot::procfs::ProcfsTree;
pub use snapshot::Capabilities;
pub use snapshot::SnapshotReader;
pub use tree::ProcessTree;
