//! Operation options: loading, layering and validation.
//!
//! Every operation is driven by an [`Options`] value. Options are sparse: each
//! field is optional, and layers are merged field by field before use:
//!
//! ```text
//! Options::stock()          allow_empty = true, dot = true, nocase = true
//!   ← hekyll.toml           (optional, see `load_config`)
//!   ← Hekyll base options   (set once per handle)
//!   ← per-call options      (set per operation)
//! ```
//!
//! The merged value is then resolved into a fully-typed [`Settings`] together
//! with the destination function. Resolution is the only validation the
//! library performs and it happens before any file is touched.
//!
//! ## Config File
//!
//! ```toml
//! cwd = "site"                # Source tree (relative to this file)
//! dest_base = "out"           # Output root (relative to this file)
//! allow_empty = true          # A pattern matching nothing is not an error
//! dot = true                  # Wildcards match hidden files
//! nocase = true               # Case-insensitive matching
//! yfm = true                  # Converter keeps front matter untouched
//! frame = ["page", "site"]    # Variables bound by the frame wrapper
//! threads = 4                 # Omit for one worker per CPU core
//! error_policy = "collect"    # or "fail-fast"
//! ```
//!
//! Unknown keys are ignored with a warning, so a config written for a newer
//! version still loads.

use crate::file::FileRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Config file looked up in the working directory by the CLI.
pub const CONFIG_FILE: &str = "hekyll.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required option `{0}`")]
    Missing(&'static str),
    #[error("invalid option `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Error returned by a destination function.
pub type DestError = Box<dyn std::error::Error + Send + Sync>;

/// Maps a file to its destination subdirectory under `dest_base`.
pub type DestFn = Arc<dyn Fn(&FileRecord) -> Result<PathBuf, DestError> + Send + Sync>;

/// Destination function placing every file at its relative path.
pub fn flat_dest() -> DestFn {
    Arc::new(|_| Ok(PathBuf::new()))
}

/// Destination function placing every file under `subdir`.
pub fn into_dest(subdir: impl Into<PathBuf>) -> DestFn {
    let subdir = subdir.into();
    Arc::new(move |_| Ok(subdir.clone()))
}

/// How an operation reacts to a failing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Process every file, then report all failures together.
    #[default]
    Collect,
    /// Start no new files after the first failure and report it alone.
    /// Files already in flight still finish.
    FailFast,
}

/// Sparse operation options. `None` means "not set at this layer".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub cwd: Option<PathBuf>,
    pub dest_base: Option<PathBuf>,
    pub allow_empty: Option<bool>,
    pub dot: Option<bool>,
    pub nocase: Option<bool>,
    /// Stylesheet import appended by `copy`.
    pub add_import: Option<String>,
    pub yfm: Option<bool>,
    /// Input patterns; each operation has its own defaults.
    pub patterns: Option<Vec<String>>,
    pub frame: Option<Vec<String>>,
    pub threads: Option<usize>,
    pub error_policy: Option<ErrorPolicy>,
}

impl Options {
    /// The bottom layer every resolution starts from.
    pub fn stock() -> Self {
        Self {
            allow_empty: Some(true),
            dot: Some(true),
            nocase: Some(true),
            ..Self::default()
        }
    }

    /// Overlay `overlay` on top of `self`; fields set in `overlay` win.
    pub fn merge(self, overlay: Options) -> Self {
        Self {
            cwd: overlay.cwd.or(self.cwd),
            dest_base: overlay.dest_base.or(self.dest_base),
            allow_empty: overlay.allow_empty.or(self.allow_empty),
            dot: overlay.dot.or(self.dot),
            nocase: overlay.nocase.or(self.nocase),
            add_import: overlay.add_import.or(self.add_import),
            yfm: overlay.yfm.or(self.yfm),
            patterns: overlay.patterns.or(self.patterns),
            frame: overlay.frame.or(self.frame),
            threads: overlay.threads.or(self.threads),
            error_policy: overlay.error_policy.or(self.error_policy),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_dest_base(mut self, dest_base: impl Into<PathBuf>) -> Self {
        self.dest_base = Some(dest_base.into());
        self
    }

    pub fn with_patterns<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_add_import(mut self, name: impl Into<String>) -> Self {
        self.add_import = Some(name.into());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    /// Validate the merged options into [`Settings`].
    ///
    /// Performs no filesystem access apart from reading the process working
    /// directory when `cwd` or `dest_base` is relative.
    pub fn resolve(&self, dest: Option<DestFn>) -> Result<Settings, ConfigError> {
        let cwd = self.cwd.as_deref().ok_or(ConfigError::Missing("cwd"))?;
        let dest_base = self
            .dest_base
            .as_deref()
            .ok_or(ConfigError::Missing("dest_base"))?;
        let dest = dest.ok_or(ConfigError::Missing("dest"))?;

        if cwd.as_os_str().is_empty() {
            return Err(invalid("cwd", "must not be empty"));
        }
        if dest_base.as_os_str().is_empty() {
            return Err(invalid("dest_base", "must not be empty"));
        }
        if self.threads == Some(0) {
            return Err(invalid("threads", "must be at least 1"));
        }
        if let Some(patterns) = &self.patterns {
            if patterns.iter().all(|p| p.trim().is_empty()) {
                return Err(invalid("patterns", "must contain at least one pattern"));
            }
        }
        if let Some(name) = &self.add_import {
            if name.trim().is_empty() || name.contains(['"', '\n']) {
                return Err(invalid("add_import", format!("{name:?} is not an import name")));
            }
        }
        let frame = match &self.frame {
            Some(vars) => {
                if let Some(bad) = vars.iter().find(|v| !is_identifier(v)) {
                    return Err(invalid("frame", format!("{bad:?} is not a variable name")));
                }
                vars.clone()
            }
            None => crate::transform::DEFAULT_FRAME
                .iter()
                .map(|v| v.to_string())
                .collect(),
        };

        Ok(Settings {
            cwd: absolute(cwd)?,
            dest_base: absolute(dest_base)?,
            dest,
            allow_empty: self.allow_empty.unwrap_or(true),
            dot: self.dot.unwrap_or(true),
            nocase: self.nocase.unwrap_or(true),
            add_import: self.add_import.clone(),
            yfm: self.yfm.unwrap_or(true),
            patterns: self.patterns.clone(),
            frame,
            threads: effective_threads(self.threads),
            error_policy: self.error_policy.unwrap_or_default(),
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Fully resolved options for one operation run.
#[derive(Clone)]
pub struct Settings {
    pub cwd: PathBuf,
    pub dest_base: PathBuf,
    pub dest: DestFn,
    pub allow_empty: bool,
    pub dot: bool,
    pub nocase: bool,
    pub add_import: Option<String>,
    pub yfm: bool,
    /// `None` selects the operation's default patterns.
    pub patterns: Option<Vec<String>>,
    pub frame: Vec<String>,
    pub threads: usize,
    pub error_policy: ErrorPolicy,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("cwd", &self.cwd)
            .field("dest_base", &self.dest_base)
            .field("allow_empty", &self.allow_empty)
            .field("dot", &self.dot)
            .field("nocase", &self.nocase)
            .field("add_import", &self.add_import)
            .field("yfm", &self.yfm)
            .field("patterns", &self.patterns)
            .field("frame", &self.frame)
            .field("threads", &self.threads)
            .field("error_policy", &self.error_policy)
            .finish_non_exhaustive()
    }
}

/// Resolve the worker count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (callers can constrain down, not up)
pub fn effective_threads(requested: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

/// Parse options from TOML, returning them together with every ignored key.
pub fn parse_options(content: &str) -> Result<(Options, Vec<String>), ConfigError> {
    let mut ignored = Vec::new();
    let deserializer = toml::Deserializer::new(content);
    let options = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
        ignored.push(path.to_string());
    })?;
    Ok((options, ignored))
}

/// Load options from a config file.
///
/// Relative `cwd` and `dest_base` values are taken relative to the file's
/// directory. Unknown keys are logged and skipped.
pub fn load_options(path: &Path) -> Result<Options, ConfigError> {
    let content = fs::read_to_string(path)?;
    let (mut options, ignored) = parse_options(&content)?;
    for key in &ignored {
        warn!(file = %path.display(), key = %key, "ignoring unknown config key");
    }
    let base = path.parent().unwrap_or(Path::new(""));
    options.cwd = options.cwd.map(|p| base.join(p));
    options.dest_base = options.dest_base.map(|p| base.join(p));
    Ok(options)
}

/// Load `hekyll.toml` from `root`, or empty options if there is none.
pub fn load_config(root: &Path) -> Result<Options, ConfigError> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(Options::default());
    }
    load_options(&path)
}

/// Returns a fully-commented sample `hekyll.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Hekyll Configuration
# =====================
#
# All options are optional. Values set on the command line override
# values set here.

# Source tree to convert, relative to this file.
# cwd = "."

# Output root, relative to this file.
# dest_base = "dist"

# Let an operation succeed when one of its patterns matches nothing.
allow_empty = true

# Let wildcards match files and directories whose name starts with a dot.
dot = true

# Match patterns case-insensitively.
nocase = true

# Leave a leading front-matter block to the converter untouched.
yfm = true

# Variables bound by the frame wrapper, in order.
frame = ["page", "site"]

# Parallel workers. Omit for one worker per CPU core; larger values are
# clamped to the core count.
# threads = 4

# "collect": process every file and report all failures at the end.
# "fail-fast": stop starting new files after the first failure.
error_policy = "collect"
"##
}
