//! Construction of a process tree implementation for the running platform.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use derive_more::Display;
use tracing::debug;
use tracing::warn;

use crate::ProcTreeError;
use crate::ProcfsTree;
use crate::ResourceCalculatorTree;
use crate::Result;
use crate::TreeConfig;

/// Registry name of the built-in proc filesystem implementation.
pub const PROCFS_IMPLEMENTATION: &str = "procfs";

/// Operating system the surrounding system runs on.
///
/// Detected once by the caller and passed in, so the factory can be driven
/// with synthetic platforms.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Platform {
    #[display("Linux")]
    Linux,
    #[display("{_0}")]
    Unsupported(String),
}

impl Platform {
    /// Platform of the running process.
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Maps an OS name such as `linux` or `Linux 6.1` to a platform.
    pub fn from_os_name(os_name: &str) -> Self {
        let trimmed = os_name.trim();
        let is_linux = trimmed
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("linux"));
        if is_linux {
            Self::Linux
        } else {
            Self::Unsupported(trimmed.to_string())
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Linux)
    }
}

/// Outcome of asking for a process tree.
///
/// `Unavailable` means resource accounting is disabled; callers are expected
/// to skip whatever depends on it rather than abort.
pub enum TreeSelection {
    Unavailable,
    Tree(Box<dyn ResourceCalculatorTree>),
}

impl TreeSelection {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Tree(_))
    }

    pub fn into_tree(self) -> Option<Box<dyn ResourceCalculatorTree>> {
        match self {
            Self::Tree(tree) => Some(tree),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Debug for TreeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("Unavailable"),
            Self::Tree(tree) => f
                .debug_struct("Tree")
                .field("root_pid", &tree.root_pid())
                .finish(),
        }
    }
}

/// Builds a tree implementation for a root pid.
pub trait TreeConstructor: Send + Sync {
    fn construct(
        &self,
        root_pid: u32,
        config: &TreeConfig,
    ) -> Result<Box<dyn ResourceCalculatorTree>, ProcTreeError>;
}

impl<F> TreeConstructor for F
where
    F: Fn(u32, &TreeConfig) -> Result<Box<dyn ResourceCalculatorTree>, ProcTreeError>
        + Send
        + Sync,
{
    fn construct(
        &self,
        root_pid: u32,
        config: &TreeConfig,
    ) -> Result<Box<dyn ResourceCalculatorTree>, ProcTreeError> {
        self(root_pid, config)
    }
}

fn construct_procfs(
    root_pid: u32,
    config: &TreeConfig,
) -> Result<Box<dyn ResourceCalculatorTree>, ProcTreeError> {
    Ok(Box::new(ProcfsTree::from_config(root_pid, config)?))
}

/// Creates a process tree rooted at `root_pid`.
///
/// An explicit `implementation` is used as is. Otherwise the platform picks
/// the built-in implementation, and unsupported platforms get
/// [`TreeSelection::Unavailable`]. A constructor that fails also yields
/// `Unavailable`; nothing here returns an error.
pub fn create_process_tree(
    root_pid: u32,
    implementation: Option<&dyn TreeConstructor>,
    platform: &Platform,
    config: &TreeConfig,
) -> TreeSelection {
    let constructor: &dyn TreeConstructor = match (implementation, platform) {
        (Some(constructor), _) => constructor,
        (None, Platform::Linux) => &construct_procfs,
        (None, Platform::Unsupported(os_name)) => {
            debug!(%os_name, "No process tree implementation for platform");
            return TreeSelection::Unavailable;
        }
    };
    construct(constructor, root_pid, config)
}

fn construct(
    constructor: &dyn TreeConstructor,
    root_pid: u32,
    config: &TreeConfig,
) -> TreeSelection {
    match constructor.construct(root_pid, config) {
        Ok(tree) => TreeSelection::Tree(tree),
        Err(report) => {
            warn!(
                root_pid,
                error = ?report,
                "Failed to create process tree, resource accounting disabled"
            );
            TreeSelection::Unavailable
        }
    }
}

/// Named tree implementations, selectable from configuration.
#[derive(Clone)]
pub struct TreeRegistry {
    constructors: HashMap<String, Arc<dyn TreeConstructor>>,
}

impl TreeRegistry {
    /// Creates a registry without any implementation.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in implementations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PROCFS_IMPLEMENTATION, construct_procfs);
        registry
    }

    /// Registers `constructor` under `name`, replacing any previous one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: impl TreeConstructor + 'static,
    ) -> &mut Self {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Creates a process tree rooted at `root_pid`.
    ///
    /// The implementation is `implementation` if given, else
    /// [`TreeConfig::implementation`], else the platform default. An unknown
    /// name yields [`TreeSelection::Unavailable`].
    pub fn create(
        &self,
        root_pid: u32,
        implementation: Option<&str>,
        platform: &Platform,
        config: &TreeConfig,
    ) -> TreeSelection {
        let Some(name) = implementation.or(config.implementation.as_deref()) else {
            return create_process_tree(root_pid, None, platform, config);
        };

        match self.constructors.get(name) {
            Some(constructor) => construct(constructor.as_ref(), root_pid, config),
            None => {
                warn!(
                    implementation = name,
                    known = ?self.names(),
                    "Unknown process tree implementation, resource accounting disabled"
                );
                TreeSelection::Unavailable
            }
        }
    }
}

impl Default for TreeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TreeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeRegistry")
            .field("implementations", &self.names())
            .finish()
    }
}
