//! The four conversion operations and the streaming runner behind them.
//!
//! An operation is a pattern set, a fixed chain of stages and an output
//! extension rule:
//!
//! | Operation | Stages | Extension |
//! |-----------|--------|-----------|
//! | `templates` | normalize-newlines → strip-empty-matter → convert → format → wrap-frame | remap table |
//! | `copy` | strip-empty-matter → convert (no front matter) → wrap-frame → add-import → trim | `liquid` → `hbs` |
//! | `assets` | none, bytes copied verbatim | `liquid` → `hbs` |
//! | `text` | strip-empty-matter | `liquid` → `hbs` |
//!
//! Every stage skips binary and null (directory) records on its own, so a
//! `.png` that slips into `copy` is still written byte for byte.
//!
//! ## Execution
//!
//! ```text
//! walkdir ─► pattern filter ─► par_bridge ─► read ─► stages ─► dest ─► write
//!   (lazy, one thread)                    (rayon pool, `threads` workers)
//! ```
//!
//! Files are read, transformed and written while the walk is still running.
//! Stage order within a file is fixed; across files nothing is ordered, and
//! the [`RunReport`] sorts its entries by source path.
//!
//! Failures are collected per file with the path and stage that failed.
//! Under [`ErrorPolicy::Collect`] all files are attempted; under
//! [`ErrorPolicy::FailFast`] no file starts after the first failure, but files
//! already in flight finish writing.

use crate::config::{ConfigError, DestError, ErrorPolicy, Settings};
use crate::convert::{self, ConvertError, ConvertOptions, TemplateConverter};
use crate::file::FileRecord;
use crate::glob::{self, MatchOptions, PatternError, PatternSet, ScanEntry};
use crate::transform;
use rayon::iter::{ParallelBridge, ParallelIterator};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix given to every helper the converter introduces.
pub const CONVERT_PREFIX: &str = "@";

/// Extensions treated as stylesheets by the import stage.
pub const STYLESHEET_EXTENSIONS: &[&str] = &[".scss", ".css", ".less"];

pub const TEMPLATE_PATTERNS: &[&str] = &[
    "{,_*/**/}*.{html,liquid,markdown,mdown,mkdown,mkdn,mkd,md,textile}",
    "!**/{README*,LICENSE*,CONTRIBUTING*}",
];

pub const TEXT_PATTERNS: &[&str] = &[
    "**/*",
    "!**/{_*,assets,public,*.{html,liquid,markdown,mdown,mkdown,mkdn,mkd,md,scss,txt,xml}}",
    "!**/{*.,}gem*",
    "!**/script{,/**}",
    "!**/.git{,/**}",
    "!hekyll.toml",
];

#[derive(Error, Debug)]
pub enum FileErrorKind {
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConvertError),
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    #[error("destination function failed: {0}")]
    Destination(DestError),
}

/// A failure attributed to one source file.
#[derive(Error, Debug)]
#[error("{}: {stage}: {kind}", .path.display())]
pub struct FileError {
    pub path: PathBuf,
    /// Name of the stage that failed (`read`, `convert`, `dest`, `write`, ...).
    pub stage: &'static str,
    #[source]
    pub kind: FileErrorKind,
}

impl FileError {
    fn new(path: &Path, stage: &'static str, kind: impl Into<FileErrorKind>) -> Self {
        Self {
            path: path.to_path_buf(),
            stage,
            kind: kind.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("no files matched {}", .patterns.join(", "))]
    NoMatch { patterns: Vec<String> },
    #[error(transparent)]
    File(FileError),
    #[error("{}", summarize(.0))]
    Files(Vec<FileError>),
}

impl PipelineError {
    /// Every file-level failure carried by this error.
    pub fn file_errors(&self) -> &[FileError] {
        match self {
            PipelineError::File(err) => std::slice::from_ref(err),
            PipelineError::Files(errs) => errs,
            _ => &[],
        }
    }
}

fn summarize(errors: &[FileError]) -> String {
    let mut out = format!("{} file(s) failed", errors.len());
    for err in errors {
        out.push_str("\n  ");
        out.push_str(&err.to_string());
    }
    out
}

/// One rewrite step applied to a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NormalizeNewlines,
    StripEmptyMatter,
    Convert { yfm: bool },
    Format,
    WrapFrame,
    AddImport,
    Trim,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::NormalizeNewlines => "normalize-newlines",
            Stage::StripEmptyMatter => "strip-empty-matter",
            Stage::Convert { .. } => "convert",
            Stage::Format => "format",
            Stage::WrapFrame => "wrap-frame",
            Stage::AddImport => "add-import",
            Stage::Trim => "trim",
        }
    }

    /// Apply the stage in place. Binary and null records are left untouched.
    pub fn apply(
        &self,
        file: &mut FileRecord,
        settings: &Settings,
        converter: &dyn TemplateConverter,
    ) -> Result<(), ConvertError> {
        if !self.applies_to(file, settings) {
            return Ok(());
        }
        let Some(text) = file.text() else {
            return Ok(());
        };
        let rewritten = match self {
            Stage::NormalizeNewlines => transform::normalize_newlines(&text).into_owned(),
            Stage::StripEmptyMatter => transform::strip_empty_matter(&text).to_string(),
            Stage::Convert { yfm } => {
                let mut options = ConvertOptions::with_prefix(CONVERT_PREFIX);
                options.yfm = *yfm;
                converter.convert(&text, &options)?
            }
            Stage::Format => transform::format(&text),
            Stage::WrapFrame => transform::wrap_frame(&text, &settings.frame).into_owned(),
            Stage::AddImport => match &settings.add_import {
                Some(name) => transform::add_import(&text, name),
                None => return Ok(()),
            },
            Stage::Trim => transform::trim(&text),
        };
        if rewritten != text {
            file.set_text(rewritten);
        }
        Ok(())
    }

    fn applies_to(&self, file: &FileRecord, settings: &Settings) -> bool {
        if file.is_null() || file.is_binary() {
            return false;
        }
        match self {
            Stage::Convert { .. } => convert::is_convertible(file.extension()),
            Stage::AddImport => {
                settings.add_import.is_some()
                    && STYLESHEET_EXTENSIONS.contains(&file.extension())
            }
            _ => true,
        }
    }
}

/// The four named operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Templates,
    Copy,
    Assets,
    Text,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Templates => "templates",
            Operation::Copy => "copy",
            Operation::Assets => "assets",
            Operation::Text => "text",
        }
    }

    /// Patterns used when none are configured. `copy` and `assets` have none.
    pub fn default_patterns(self) -> &'static [&'static str] {
        match self {
            Operation::Templates => TEMPLATE_PATTERNS,
            Operation::Text => TEXT_PATTERNS,
            Operation::Copy | Operation::Assets => &[],
        }
    }

    pub fn stages(self, settings: &Settings) -> Vec<Stage> {
        match self {
            Operation::Templates => vec![
                Stage::NormalizeNewlines,
                Stage::StripEmptyMatter,
                Stage::Convert { yfm: settings.yfm },
                Stage::Format,
                Stage::WrapFrame,
            ],
            Operation::Copy => vec![
                Stage::StripEmptyMatter,
                Stage::Convert { yfm: false },
                Stage::WrapFrame,
                Stage::AddImport,
                Stage::Trim,
            ],
            Operation::Assets => Vec::new(),
            Operation::Text => vec![Stage::StripEmptyMatter],
        }
    }

    pub fn output_extension(self, extension: &str) -> String {
        match self {
            Operation::Templates => transform::remap_extension(extension).into_owned(),
            _ => transform::replace_liquid(extension).into_owned(),
        }
    }

    fn patterns(self, settings: &Settings) -> Result<Vec<String>, ConfigError> {
        match &settings.patterns {
            Some(patterns) => Ok(patterns.clone()),
            None if !self.default_patterns().is_empty() => {
                Ok(self.default_patterns().iter().map(|p| p.to_string()).collect())
            }
            None => Err(ConfigError::Missing("patterns")),
        }
    }
}

/// One entry written to the destination tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFile {
    /// Source path relative to `cwd`.
    pub source: PathBuf,
    pub dest: PathBuf,
    pub directory: bool,
    pub bytes: u64,
}

/// Outcome of a successful operation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub operation: Operation,
    pub cwd: PathBuf,
    pub dest_base: PathBuf,
    /// Sorted by source path.
    pub written: Vec<WrittenFile>,
}

impl RunReport {
    pub fn files(&self) -> impl Iterator<Item = &WrittenFile> {
        self.written.iter().filter(|w| !w.directory)
    }

    pub fn directories(&self) -> impl Iterator<Item = &WrittenFile> {
        self.written.iter().filter(|w| w.directory)
    }
}

/// Run `operation` over the files selected by `settings`.
pub fn run(
    operation: Operation,
    settings: &Settings,
    converter: &dyn TemplateConverter,
) -> Result<RunReport, PipelineError> {
    let mut patterns = operation.patterns(settings)?;
    if let Some(inner) = nested_dest(settings) {
        patterns.push(format!("!{}", glob::literal(&inner)));
    }
    let set = PatternSet::new(
        &patterns,
        MatchOptions {
            dot: settings.dot,
            nocase: settings.nocase,
        },
    )?;
    let stages = operation.stages(settings);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads)
        .build()?;

    info!(
        operation = operation.name(),
        cwd = %settings.cwd.display(),
        dest = %settings.dest_base.display(),
        threads = settings.threads,
        "starting"
    );

    let fail_fast = settings.error_policy == ErrorPolicy::FailFast;
    let stop = AtomicBool::new(false);
    let matched: Vec<AtomicBool> = set
        .positive_patterns()
        .iter()
        .map(|_| AtomicBool::new(false))
        .collect();
    let written = Mutex::new(Vec::new());
    let errors = Mutex::new(Vec::new());

    pool.install(|| {
        glob::scan(&settings.cwd, &set)
            .take_while(|_| !stop.load(Ordering::SeqCst))
            .par_bridge()
            .for_each(|entry| {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let result = entry
                    .map_err(|err| scan_error(&settings.cwd, err))
                    .and_then(|entry| {
                        for &i in &entry.patterns {
                            matched[i].store(true, Ordering::Relaxed);
                        }
                        process(operation, entry, &stages, settings, converter)
                    });
                match result {
                    Ok(file) => lock(&written).push(file),
                    Err(err) => {
                        warn!(error = %err, "file failed");
                        if fail_fast {
                            stop.store(true, Ordering::SeqCst);
                        }
                        lock(&errors).push(err);
                    }
                }
            });
    });

    let mut errors = errors.into_inner().unwrap_or_else(PoisonError::into_inner);
    if !errors.is_empty() {
        return Err(if fail_fast {
            PipelineError::File(errors.swap_remove(0))
        } else {
            errors.sort_by(|a, b| a.path.cmp(&b.path));
            PipelineError::Files(errors)
        });
    }

    if !settings.allow_empty {
        let unmatched: Vec<String> = set
            .positive_patterns()
            .iter()
            .zip(&matched)
            .filter(|(_, hit)| !hit.load(Ordering::Relaxed))
            .map(|(pattern, _)| pattern.clone())
            .collect();
        if !unmatched.is_empty() {
            return Err(PipelineError::NoMatch {
                patterns: unmatched,
            });
        }
    }

    let mut written = written.into_inner().unwrap_or_else(PoisonError::into_inner);
    written.sort_by(|a, b| a.source.cmp(&b.source));
    info!(
        operation = operation.name(),
        written = written.len(),
        "finished"
    );
    Ok(RunReport {
        operation,
        cwd: settings.cwd.clone(),
        dest_base: settings.dest_base.clone(),
        written,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `dest_base` relative to `cwd`, when it lies strictly inside it.
fn nested_dest(settings: &Settings) -> Option<PathBuf> {
    let inner = settings.dest_base.strip_prefix(&settings.cwd).ok()?;
    (!inner.as_os_str().is_empty()).then(|| inner.to_path_buf())
}

fn scan_error(cwd: &Path, err: walkdir::Error) -> FileError {
    let path = err.path().unwrap_or(cwd).to_path_buf();
    FileError::new(&path, "scan", std::io::Error::from(err))
}

/// Read, transform and write one matched entry.
fn process(
    operation: Operation,
    entry: ScanEntry,
    stages: &[Stage],
    settings: &Settings,
    converter: &dyn TemplateConverter,
) -> Result<WrittenFile, FileError> {
    let contents = if entry.is_dir {
        None
    } else {
        Some(fs::read(&entry.path).map_err(|e| FileError::new(&entry.path, "read", e))?)
    };
    let source = entry.relative.clone();
    let mut file =
        FileRecord::new(entry.path, entry.relative, contents).with_base_relative(entry.output);
    debug!(file = %file.relative_path().display(), "processing");

    for stage in stages {
        stage
            .apply(&mut file, settings, converter)
            .map_err(|e| FileError::new(file.source_path(), stage.name(), e))?;
    }

    let extension = operation.output_extension(file.extension());
    file.set_extension(&extension);

    let subdir = (settings.dest)(&file).map_err(|e| FileError {
        path: file.source_path().to_path_buf(),
        stage: "dest",
        kind: FileErrorKind::Destination(e),
    })?;
    let target = settings
        .dest_base
        .join(subdir)
        .join(file.output_relative_path());
    write(file, source, target)
}

fn write(file: FileRecord, source: PathBuf, target: PathBuf) -> Result<WrittenFile, FileError> {
    let path = file.source_path().to_path_buf();
    let fail = |e: std::io::Error| FileError::new(&path, "write", e);

    let (directory, bytes) = match file.into_contents() {
        None => {
            fs::create_dir_all(&target).map_err(fail)?;
            (true, 0)
        }
        Some(bytes) => {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(fail)?;
            }
            fs::write(&target, &bytes).map_err(fail)?;
            (false, bytes.len() as u64)
        }
    };
    debug!(dest = %target.display(), bytes, "wrote");
    Ok(WrittenFile {
        source,
        dest: target,
        directory,
        bytes,
    })
}
