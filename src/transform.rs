//! Pure text rewrites applied by the pipeline stages.
//!
//! Every function here is a total `&str -> String` (or `Cow`) transformation
//! with no I/O. The pipeline decides *whether* a rewrite runs for a given file
//! (binary and null records are always skipped); these functions only decide
//! *what* the rewrite does.
//!
//! | Function | Effect |
//! |----------|--------|
//! | [`strip_empty_matter`] | drop a leading `---\n---\n` block |
//! | [`normalize_newlines`] | CR-LF → LF |
//! | [`wrap_frame`] | wrap template bodies in `{{#frame ...}}` |
//! | [`format`] | stylesheet path fix, de-indent markdown block tags |
//! | [`add_import`] | append an `@import` line |
//! | [`trim`] | trim and end with one newline |
//! | [`remap_extension`] | output extension table for templates |

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// An empty YAML front-matter block: two marker lines with nothing between.
pub const EMPTY_MATTER: &str = "---\n---\n";

/// Front-matter delimiter that marks a file as carrying its own context.
pub const MATTER_DELIMITER: &str = "---";

/// Template marker that makes a file eligible for frame wrapping.
pub const TEMPLATE_MARKER: &str = "{{";

/// Frame variables bound by the templates and copy operations.
pub const DEFAULT_FRAME: &[&str] = &["page", "site"];

static STYLES_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(styles\.css)").expect("valid regex"));

static INDENTED_MARKDOWN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]+(\{\{[#/]?(?:markdown|md)\b)").expect("valid regex")
});

/// Remove an empty front-matter block at the very start of the content.
pub fn strip_empty_matter(text: &str) -> &str {
    text.strip_prefix(EMPTY_MATTER).unwrap_or(text)
}

/// Replace every CR-LF pair with a single LF.
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Wrap a template body in a `frame` block binding each of `vars` to itself.
///
/// Content without template markers, or starting with a front-matter
/// delimiter, is returned unchanged. Bindings appear in the order given.
///
/// ```text
/// {{#frame page=page site=site}}
/// <trimmed content>
/// {{/frame}}
/// ```
pub fn wrap_frame<'a, S: AsRef<str>>(text: &'a str, vars: &[S]) -> Cow<'a, str> {
    if !text.contains(TEMPLATE_MARKER) || text.starts_with(MATTER_DELIMITER) {
        return Cow::Borrowed(text);
    }
    let hash: Vec<String> = vars
        .iter()
        .map(|v| format!("{0}={0}", v.as_ref()))
        .collect();
    Cow::Owned(format!(
        "{{{{#frame {}}}}}\n{}\n{{{{/frame}}}}\n",
        hash.join(" "),
        text.trim()
    ))
}

/// Cosmetic fixes for converted templates.
///
/// - `/styles.css` is redirected to `/assets/css/styles.css`.
/// - Indentation before `markdown`/`md` block tags (opening, closing and
///   inline forms) is removed; the target engine would otherwise render the
///   indented block as a code block.
pub fn format(text: &str) -> String {
    let text = STYLES_PATH.replace_all(text, "/assets/css/$1");
    INDENTED_MARKDOWN_TAG.replace_all(&text, "$1").into_owned()
}

/// Append `@import "<name>";` to trimmed stylesheet content.
pub fn add_import(text: &str, name: &str) -> String {
    format!("{}\n@import \"{name}\";\n", text.trim())
}

/// Trim surrounding whitespace and end with exactly one newline.
pub fn trim(text: &str) -> String {
    format!("{}\n", text.trim())
}

/// Output extension for a template file.
///
/// ```text
/// .html                                   → .hbs
/// .markdown .mdown .mkdown .mkdn .mkd .md → .md
/// .yaml                                   → .yml
/// *liquid*                                → liquid replaced by hbs
/// ```
pub fn remap_extension(extension: &str) -> Cow<'_, str> {
    match extension {
        ".html" => Cow::Borrowed(".hbs"),
        ".markdown" | ".mdown" | ".mkdown" | ".mkdn" | ".mkd" | ".md" => Cow::Borrowed(".md"),
        ".yaml" => Cow::Borrowed(".yml"),
        ext => replace_liquid(ext),
    }
}

/// Replace the first `liquid` in an extension with `hbs`.
///
/// Applied to every operation's output, so `.liquid` partials copied by
/// `copy` or `text` are renamed too.
pub fn replace_liquid(extension: &str) -> Cow<'_, str> {
    if extension.contains("liquid") {
        Cow::Owned(extension.replacen("liquid", "hbs", 1))
    } else {
        Cow::Borrowed(extension)
    }
}
