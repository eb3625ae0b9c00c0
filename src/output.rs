//! CLI output formatting for operation reports and failures.
//!
//! # Output Format
//!
//! ## Run report
//!
//! ```text
//! templates (2 files, 1 directory)
//!     001 _layouts/default.html → _layouts/default.hbs
//!     002 index.html → index.hbs
//!     003 _includes/ → _includes/
//! ```
//!
//! ## Build summary
//!
//! ```text
//! Wrote 14 files, 3 directories in 9 steps
//! ```
//!
//! ## Failures
//!
//! ```text
//! 2 file(s) failed
//! _layouts/post.html
//!     Stage: convert
//!     Cause: conversion failed: unterminated tag starting on line 4
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout or stderr.
//! Format functions are pure: no I/O, no side effects.

use crate::pipeline::{FileError, PipelineError, RunReport, WrittenFile};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn count(n: usize, one: &str, many: &str) -> String {
    match n {
        1 => format!("1 {one}"),
        _ => format!("{n} {many}"),
    }
}

/// Display `path` relative to `base` when it lies inside it.
fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn written_line(index: usize, written: &WrittenFile, dest_base: &Path) -> String {
    let slash = if written.directory { "/" } else { "" };
    format!(
        "{}{} {}{slash} \u{2192} {}{slash}",
        indent(1),
        format_index(index),
        written.source.to_string_lossy().replace('\\', "/"),
        relative_display(&written.dest, dest_base),
    )
}

// ============================================================================
// Run reports
// ============================================================================

/// Format one operation report: a header, then one line per written entry.
pub fn format_run_report(report: &RunReport) -> Vec<String> {
    let files = report.files().count();
    let dirs = report.directories().count();
    let mut header = format!(
        "{} ({}",
        report.operation.name(),
        count(files, "file", "files")
    );
    if dirs > 0 {
        header.push_str(", ");
        header.push_str(&count(dirs, "directory", "directories"));
    }
    header.push(')');

    let mut lines = vec![header];
    for (i, written) in report.files().chain(report.directories()).enumerate() {
        lines.push(written_line(i + 1, written, &report.dest_base));
    }
    lines
}

/// Print an operation report to stdout.
pub fn print_run_report(report: &RunReport) {
    for line in format_run_report(report) {
        println!("{}", line);
    }
}

/// One-line total over several reports.
pub fn format_build_summary(reports: &[RunReport]) -> Vec<String> {
    let files: usize = reports.iter().map(|r| r.files().count()).sum();
    let dirs: usize = reports.iter().map(|r| r.directories().count()).sum();
    vec![format!(
        "Wrote {}, {} in {}",
        count(files, "file", "files"),
        count(dirs, "directory", "directories"),
        count(reports.len(), "step", "steps")
    )]
}

/// Print the build summary to stdout.
pub fn print_build_summary(reports: &[RunReport]) {
    for line in format_build_summary(reports) {
        println!("{}", line);
    }
}

/// Serialize reports as pretty JSON for `--json`.
pub fn format_json(reports: &[RunReport]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(reports)
}

// ============================================================================
// Failures
// ============================================================================

fn file_error_lines(err: &FileError, cwd: Option<&Path>, lines: &mut Vec<String>) {
    let path = match cwd {
        Some(cwd) => relative_display(&err.path, cwd),
        None => err.path.to_string_lossy().into_owned(),
    };
    lines.push(path);
    lines.push(format!("{}Stage: {}", indent(1), err.stage));
    lines.push(format!("{}Cause: {}", indent(1), err.kind));
}

/// Format a pipeline failure. File paths are shown relative to `cwd`.
pub fn format_pipeline_error(err: &PipelineError, cwd: Option<&Path>) -> Vec<String> {
    let files = err.file_errors();
    if files.is_empty() {
        return vec![err.to_string()];
    }
    let mut lines = vec![format!("{} file(s) failed", files.len())];
    for file in files {
        file_error_lines(file, cwd, &mut lines);
    }
    lines
}

/// Print a pipeline failure to stderr.
pub fn print_pipeline_error(err: &PipelineError, cwd: Option<&Path>) {
    for line in format_pipeline_error(err, cwd) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
