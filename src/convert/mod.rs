//! Template dialect conversion boundary.
//!
//! The pipeline treats conversion as an injected capability: anything that
//! implements [`TemplateConverter`] can be plugged into an operation. The
//! bundled [`LiquidConverter`] rewrites Liquid tags into Handlebars; tests use
//! fakes that echo or fail deterministically.
//!
//! Conversion only runs on files whose extension is in
//! [`CONVERTIBLE_EXTENSIONS`]. Everything else passes through untouched.

pub mod expr;
pub mod liquid;

pub use liquid::LiquidConverter;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unterminated tag starting on line {line}")]
    Unterminated { line: usize },
    #[error("unexpected {{% {tag} %}} on line {line}")]
    UnexpectedTag { tag: String, line: usize },
    #[error("{{% {tag} %}} opened on line {line} is never closed")]
    Unclosed { tag: String, line: usize },
    #[error("malformed {{% {tag} %}} on line {line}")]
    Malformed { tag: String, line: usize },
    #[error("{0}")]
    Other(String),
}

/// Extensions the converter is applied to, with the leading dot.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    ".markdown", ".mdown", ".mkdown", ".mkdn", ".mkd", ".md", ".html", ".liquid", ".scss",
    ".xml", ".txt",
];

pub fn is_convertible(extension: &str) -> bool {
    CONVERTIBLE_EXTENSIONS.contains(&extension)
}

/// Options passed to every conversion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Prepended to every helper name the converter introduces, so converted
    /// helpers can be told apart from helpers already present in the source.
    pub prefix: String,
    /// Leave a leading YAML front-matter block untouched. Disabled for
    /// stylesheets and data files, which have no front matter.
    pub yfm: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            yfm: true,
        }
    }
}

impl ConvertOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn without_yfm(mut self) -> Self {
        self.yfm = false;
        self
    }
}

/// Rewrites template syntax from one dialect to another.
///
/// Implementations must be `Sync`: operations convert many files at once
/// from a rayon pool.
pub trait TemplateConverter: Sync {
    fn convert(&self, text: &str, options: &ConvertOptions) -> Result<String, ConvertError>;
}

impl<F> TemplateConverter for F
where
    F: Fn(&str, &ConvertOptions) -> Result<String, ConvertError> + Sync,
{
    fn convert(&self, text: &str, options: &ConvertOptions) -> Result<String, ConvertError> {
        self(text, options)
    }
}
