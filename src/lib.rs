//! # Hekyll
//!
//! Converts a Jekyll site source tree (Liquid templates) into an Assemble
//! site source tree (Handlebars templates). Layouts, includes and posts are
//! rewritten; data files, stylesheets and assets are carried across with the
//! file layout and extensions the target expects.
//!
//! # Architecture: Four Operations Over One Pipeline
//!
//! Every operation selects files with glob patterns, threads each one through
//! a fixed chain of text stages and writes the result under the output root:
//!
//! ```text
//! cwd ──scan──► FileRecord ──stage──► ... ──stage──► dest_base/<dest(file)>/<path>
//! ```
//!
//! | Operation | Selects | Rewrites |
//! |-----------|---------|----------|
//! | `templates` | html, liquid, markdown, textile | converts Liquid, fixes paths, wraps in a frame |
//! | `copy` | caller patterns | converts Liquid, appends imports, trims |
//! | `assets` | caller patterns | nothing |
//! | `text` | everything else | strips empty front matter |
//!
//! [`Hekyll::build`] runs all four over a complete site.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`file`] | `FileRecord`: paths, contents, mutable extension, memoized binary flag |
//! | [`binary`] | Binary detection by extension and content sniffing |
//! | [`transform`] | Pure text rewrites used by the stages, plus the extension table |
//! | [`convert`] | `TemplateConverter` seam and the bundled Liquid → Handlebars converter |
//! | [`glob`] | Pattern sets with braces, negation, `dot` and `nocase`; tree scanning |
//! | [`config`] | Sparse `Options`, layering, `hekyll.toml`, validation into `Settings` |
//! | [`pipeline`] | Stages, operations, parallel streaming runner, error policy |
//! | [`hekyll`] | `Hekyll` handle and the full-site `build` |
//! | [`output`] | CLI output formatting for reports and failures |
//!
//! # Design Decisions
//!
//! ## Conversion Is a Seam
//!
//! The pipeline never parses Liquid itself. It calls a [`TemplateConverter`],
//! and the CLI plugs in [`convert::LiquidConverter`]. Tests plug in fakes that
//! echo or fail on a marker, so pipeline behavior is tested independently of
//! template syntax.
//!
//! ## Validation Before I/O
//!
//! Options are merged and resolved into [`config::Settings`] before the first
//! directory is read. A missing `cwd`, `dest_base` or destination function
//! fails immediately and leaves the filesystem untouched.
//!
//! ## Per-File Failures
//!
//! A file that fails to convert, read or write is reported with its path and
//! the stage that failed. Siblings keep going by default; `fail-fast` stops
//! new files from starting but lets in-flight ones finish.

pub mod binary;
pub mod config;
pub mod convert;
pub mod file;
pub mod glob;
pub mod hekyll;
pub mod output;
pub mod pipeline;
pub mod transform;

pub use convert::TemplateConverter;
pub use hekyll::Hekyll;

#[cfg(test)]
pub(crate) mod test_helpers;
