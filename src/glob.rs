//! Input pattern sets and source-tree scanning.
//!
//! Patterns use shell-glob syntax relative to the working directory:
//!
//! - `*` and `?` stay inside one path segment, `**` crosses segments
//! - `{a,b}` alternates, nested groups allowed (`*.{md,{html,hbs}}`)
//! - a leading `!` negates: any path (or ancestor directory) matching a
//!   negative pattern is excluded, so `!**/.git` skips the whole repository
//!   metadata tree
//! - with `dot = false`, paths with a hidden segment only match patterns that
//!   spell the dot out (`.nojekyll`, `**/.well-known/**`)
//!
//! Each positive pattern has a base: its literal directory prefix. Output
//! paths are taken relative to the base of the first matching pattern, so
//! `_data/**` yields `nav.yml` rather than `_data/nav.yml`.
//!
//! Brace groups are expanded up front and each expansion is compiled with
//! `globset`, which does not accept nested alternates itself.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("unbalanced braces in {0:?}")]
    Unbalanced(String),
    #[error("no positive patterns given")]
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Let wildcards match hidden segments.
    pub dot: bool,
    /// Match case-insensitively.
    pub nocase: bool,
}

/// A compiled list of positive and negative patterns.
#[derive(Debug)]
pub struct PatternSet {
    positive: GlobSet,
    /// For each compiled positive glob: its source pattern index and whether
    /// it names a hidden segment explicitly.
    positive_meta: Vec<(usize, bool)>,
    negative: GlobSet,
    sources: Vec<String>,
    bases: Vec<PathBuf>,
    dot: bool,
    nocase: bool,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S], options: MatchOptions) -> Result<Self, PatternError> {
        let mut positive = GlobSetBuilder::new();
        let mut negative = GlobSetBuilder::new();
        let mut positive_meta = Vec::new();
        let mut sources = Vec::new();
        let mut bases = Vec::new();

        for raw in patterns {
            let raw = raw.as_ref().trim();
            let (negated, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
            if pattern.is_empty() {
                continue;
            }
            for expanded in expand_braces(pattern)? {
                let glob = GlobBuilder::new(&expanded)
                    .literal_separator(true)
                    .backslash_escape(true)
                    .case_insensitive(options.nocase)
                    .build()
                    .map_err(|source| PatternError::Glob {
                        pattern: raw.to_string(),
                        source,
                    })?;
                if negated {
                    negative.add(glob);
                } else {
                    positive.add(glob);
                    positive_meta.push((sources.len(), names_hidden_segment(&expanded)));
                }
            }
            if !negated {
                sources.push(raw.to_string());
                bases.push(pattern_base(pattern));
            }
        }

        if sources.is_empty() {
            return Err(PatternError::Empty);
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|source| PatternError::Glob {
                pattern: patterns
                    .iter()
                    .map(|p| p.as_ref())
                    .collect::<Vec<_>>()
                    .join(" "),
                source,
            })
        };

        Ok(Self {
            positive: build(positive)?,
            positive_meta,
            negative: build(negative)?,
            sources,
            bases,
            dot: options.dot,
            nocase: options.nocase,
        })
    }

    /// Positive patterns in the order given.
    pub fn positive_patterns(&self) -> &[String] {
        &self.sources
    }

    /// `relative` with the base of the positive pattern at `index` removed.
    ///
    /// Base segments compare case-insensitively under `nocase`. A path that
    /// does not lie strictly below the base is returned unchanged.
    pub fn strip_base<'p>(&self, index: usize, relative: &'p Path) -> &'p Path {
        let mut rest = relative.components();
        for expected in self.bases[index].components() {
            match rest.next() {
                Some(actual) if self.same_segment(actual.as_os_str(), expected.as_os_str()) => {}
                _ => return relative,
            }
        }
        let stripped = rest.as_path();
        if stripped.as_os_str().is_empty() {
            relative
        } else {
            stripped
        }
    }

    fn same_segment(&self, actual: &OsStr, expected: &OsStr) -> bool {
        if self.nocase {
            actual.to_string_lossy().to_lowercase() == expected.to_string_lossy().to_lowercase()
        } else {
            actual == expected
        }
    }

    /// Index of the first positive pattern matching `relative`, unless the
    /// path or one of its ancestors is excluded.
    pub fn matches(&self, relative: &Path) -> Option<usize> {
        if self.is_excluded(relative) {
            return None;
        }
        self.matches_positive(relative)
    }

    fn matches_positive(&self, relative: &Path) -> Option<usize> {
        self.positive_matches(relative).first().copied()
    }

    /// Every positive pattern matching `relative`, ascending, ignoring
    /// negative patterns.
    fn positive_matches(&self, relative: &Path) -> Vec<usize> {
        let hidden = !self.dot && has_hidden_segment(relative);
        let mut found: Vec<usize> = self
            .positive
            .matches(relative)
            .into_iter()
            .map(|i| self.positive_meta[i])
            .filter(|&(_, explicit_dot)| !hidden || explicit_dot)
            .map(|(source, _)| source)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Whether `relative` or any of its ancestors matches a negative pattern.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        relative
            .ancestors()
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.negative.is_match(a))
    }
}

/// Literal directory prefix of a pattern: the segments before the first one
/// containing glob syntax, never including the final segment.
///
/// ```text
/// _data/**            → _data
/// a/b/*.md            → a/b
/// _config.yml         → (empty)
/// {assets,public}/**  → (empty)
/// ```
pub fn pattern_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal = segments[..segments.len() - 1]
        .iter()
        .take_while(|s| !s.contains(['*', '?', '[', ']', '{', '}', '\\']))
        .count();
    segments[..literal].iter().copied().collect()
}

/// Escape `path` into a pattern matching exactly that relative path.
pub fn literal(path: &Path) -> String {
    let mut out = String::new();
    for (i, component) in path.components().enumerate() {
        if i > 0 {
            out.push('/');
        }
        for c in component.as_os_str().to_string_lossy().chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | ',' | '!' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out
}

fn has_hidden_segment(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn names_hidden_segment(pattern: &str) -> bool {
    pattern.split('/').any(|seg| seg.starts_with('.'))
}

/// Expand every `{a,b}` group, innermost groups included.
///
/// ```text
/// {,_*/**/}*.{md,html}  →  *.md  *.html  _*/**/*.md  _*/**/*.html
/// ```
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, PatternError> {
    let Some((open, close)) = find_group(pattern)? else {
        return Ok(vec![pattern.to_string()]);
    };
    let prefix = &pattern[..open];
    let inner = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    let mut out: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for alternative in split_alternatives(inner) {
        for expanded in expand_braces(&format!("{prefix}{alternative}{suffix}"))? {
            if seen.insert(expanded.clone()) {
                out.push(expanded);
            }
        }
    }
    Ok(out)
}

/// Byte offsets of the first top-level brace group.
fn find_group(pattern: &str) -> Result<Option<(usize, usize)>, PatternError> {
    let bytes = pattern.as_bytes();
    let mut open = None;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = open {
                        return Ok(Some((start, i)));
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    if depth > 0 {
        return Err(PatternError::Unbalanced(pattern.to_string()));
    }
    Ok(None)
}

fn split_alternatives(inner: &str) -> Vec<&str> {
    let bytes = inner.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&inner[start..]);
    parts
}

/// A path under the working directory that matched a pattern set.
#[derive(Debug)]
pub struct ScanEntry {
    pub path: PathBuf,
    /// Path relative to `cwd`.
    pub relative: PathBuf,
    /// Path relative to the base of the first matching pattern.
    pub output: PathBuf,
    pub is_dir: bool,
    /// Indices of every positive pattern that matched, ascending.
    pub patterns: Vec<usize>,
}

/// Lazily walk `cwd`, yielding matching entries in file-name order.
///
/// Excluded directories are pruned, so their contents are never visited.
pub fn scan<'a>(
    cwd: &'a Path,
    patterns: &'a PatternSet,
) -> impl Iterator<Item = Result<ScanEntry, walkdir::Error>> + Send + 'a {
    WalkDir::new(cwd)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !patterns.is_excluded(relative_to(cwd, entry.path())))
        .filter_map(move |entry| match entry {
            Err(err) => Some(Err(err)),
            Ok(entry) => {
                let relative = relative_to(cwd, entry.path());
                let matched = patterns.positive_matches(relative);
                if matched.is_empty() {
                    return None;
                }
                let output = patterns.strip_base(matched[0], relative);
                Some(Ok(ScanEntry {
                    output: output.to_path_buf(),
                    relative: relative.to_path_buf(),
                    path: entry.path().to_path_buf(),
                    is_dir: entry.file_type().is_dir(),
                    patterns: matched,
                }))
            }
        })
}

fn relative_to<'p>(cwd: &Path, path: &'p Path) -> &'p Path {
    path.strip_prefix(cwd).unwrap_or(path)
}
