//! The file record threaded through every pipeline stage.
//!
//! A [`FileRecord`] is created once per matched path by the scanner, owned by
//! exactly one worker while it moves through the stage chain, and consumed
//! when it is written to the destination tree.
//!
//! ## Extensions
//!
//! The extension is stored separately from the path so stages and
//! destination functions can rename output files without touching the
//! source location. It always starts with `.` or is empty:
//!
//! ```text
//! _layouts/default.html   stem = "default"   extension = ".html"
//! _config.yml             stem = "_config"   extension = ".yml"
//! CNAME                   stem = "CNAME"     extension = ""
//! .gitignore              stem = ".gitignore" extension = ""
//! ```
//!
//! ## Paths
//!
//! `relative_path` is relative to `cwd` and never changes. The output path
//! is relative to the literal base of the glob that matched, so `_data/**`
//! selects `_data/nav.yml` with output path `nav.yml`:
//!
//! ```text
//! source_path     /site/_data/nav.yml
//! relative_path   _data/nav.yml
//! output path     nav.yml            (+ current extension)
//! ```

use crate::binary;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FileRecord {
    source_path: PathBuf,
    relative_path: PathBuf,
    base_relative: PathBuf,
    stem: String,
    extension: String,
    contents: Option<Vec<u8>>,
    binary: OnceCell<bool>,
}

impl FileRecord {
    /// Create a record for a file or directory found under `cwd`.
    ///
    /// `contents` is `None` for directories. The output path starts out equal
    /// to `relative_path`; see [`FileRecord::with_base_relative`].
    pub fn new(source_path: PathBuf, relative_path: PathBuf, contents: Option<Vec<u8>>) -> Self {
        let (stem, extension) = split_extension(&relative_path);
        Self {
            source_path,
            base_relative: relative_path.clone(),
            relative_path,
            stem,
            extension,
            contents,
            binary: OnceCell::new(),
        }
    }

    /// Create a text record whose source and relative paths coincide.
    pub fn from_text(relative_path: impl Into<PathBuf>, text: &str) -> Self {
        let rel = relative_path.into();
        Self::new(rel.clone(), rel, Some(text.as_bytes().to_vec()))
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Set the path relative to the matching glob's base. Output paths are
    /// built from it.
    pub fn with_base_relative(mut self, base_relative: PathBuf) -> Self {
        self.base_relative = base_relative;
        self
    }

    /// Path relative to `cwd`.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Path relative to the base of the glob that matched.
    pub fn base_relative_path(&self) -> &Path {
        &self.base_relative
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Replace the extension. A missing leading dot is added.
    pub fn set_extension(&mut self, extension: &str) {
        self.extension = if extension.is_empty() || extension.starts_with('.') {
            extension.to_string()
        } else {
            format!(".{extension}")
        };
    }

    pub fn is_null(&self) -> bool {
        self.contents.is_none()
    }

    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }

    pub fn into_contents(self) -> Option<Vec<u8>> {
        self.contents
    }

    /// Whether the record holds binary data. Computed once and memoized.
    pub fn is_binary(&self) -> bool {
        *self
            .binary
            .get_or_init(|| binary::is_binary(&self.relative_path, self.contents()))
    }

    /// Contents as text, when the record is neither null nor binary and
    /// holds valid UTF-8.
    ///
    /// Text in another encoding yields `None`, so stages leave its bytes
    /// alone.
    pub fn text(&self) -> Option<String> {
        if self.is_binary() {
            return None;
        }
        let bytes = self.contents.as_deref()?;
        std::str::from_utf8(bytes).ok().map(str::to_string)
    }

    /// Replace the contents with `text` and drop the memoized binary flag.
    pub fn set_text(&mut self, text: String) {
        self.contents = Some(text.into_bytes());
        self.binary = OnceCell::new();
    }

    /// Path relative to the destination folder: the base-relative path with
    /// the current extension applied.
    pub fn output_relative_path(&self) -> PathBuf {
        let name = format!("{}{}", self.stem, self.extension);
        match self.base_relative.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Split a path's file name into stem and dotted extension.
///
/// Leading-dot names without a further dot (`.gitignore`) have no extension.
fn split_extension(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(0) | None => (name, String::new()),
        Some(pos) => (name[..pos].to_string(), name[pos..].to_string()),
    }
}
