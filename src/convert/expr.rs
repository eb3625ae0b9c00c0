//! Liquid expression translation: values, filter chains and conditions.
//!
//! Liquid pipes a value through filters left to right; Handlebars nests
//! helper calls. Each filter becomes a helper whose first argument is
//! everything to its left:
//!
//! ```text
//! page.date | date: "%Y" | upcase   →   upcase (date page.date "%Y")
//! ```
//!
//! Conditions group right to left, as Liquid evaluates them:
//!
//! ```text
//! a and b or c   →   and a (or b c)
//! ```

use regex::{Captures, Regex};
use std::sync::LazyLock;

static BRACKET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\['([^']*)'\]|\["([^"]*)"\]|\[(\d+)\]"#).expect("valid regex")
});

/// A translated expression: either a plain value or a helper call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Value(String),
    /// Helper name followed by its arguments, without parentheses.
    Call(String),
}

impl Expr {
    /// Form usable as an argument to another helper.
    pub fn as_arg(&self) -> String {
        match self {
            Expr::Value(v) => v.clone(),
            Expr::Call(c) => format!("({c})"),
        }
    }

    /// Form usable directly inside a mustache: `{{<body>}}`.
    pub fn as_body(&self) -> &str {
        match self {
            Expr::Value(v) | Expr::Call(v) => v,
        }
    }
}

/// Split on `sep` outside quotes, parentheses and brackets.
pub fn split_top(src: &str, sep: char) -> Vec<&str> {
    split_by(src, |c| c == sep, true)
}

/// Split on whitespace outside quotes, parentheses and brackets.
pub fn split_words(src: &str) -> Vec<&str> {
    split_by(src, char::is_whitespace, false)
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect()
}

fn split_by(src: &str, is_sep: impl Fn(char) -> bool, keep_empty: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in src.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth -= 1,
            (None, c) if depth == 0 && is_sep(c) => {
                parts.push(&src[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if keep_empty || start < src.len() {
        parts.push(&src[start..]);
    }
    parts
}

fn is_quoted(token: &str) -> bool {
    token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"'))
            || (token.starts_with('\'') && token.ends_with('\'')))
}

/// Translate a single Liquid value: literal, variable path or range.
pub fn value(token: &str, prefix: &str) -> String {
    let token = token.trim();
    if is_quoted(token) {
        return token.to_string();
    }
    match token {
        "nil" | "null" => return "null".to_string(),
        "forloop.index0" => return "@index".to_string(),
        "forloop.first" => return "@first".to_string(),
        "forloop.last" => return "@last".to_string(),
        "forloop.index" => return format!("({prefix}add @index 1)"),
        _ => {}
    }
    if let Some((lo, hi)) = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .and_then(|t| t.split_once(".."))
    {
        return format!("({prefix}range {} {})", value(lo, prefix), value(hi, prefix));
    }
    BRACKET_KEY
        .replace_all(token, |caps: &Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            format!(".[{key}]")
        })
        .into_owned()
}

/// Translate a value followed by an optional filter chain.
///
/// Returns `None` for an empty expression or an empty filter name.
pub fn expression(src: &str, prefix: &str) -> Option<Expr> {
    let mut parts = split_top(src, '|').into_iter();
    let head = parts.next()?.trim();
    if head.is_empty() {
        return None;
    }
    let mut acc = Expr::Value(value(head, prefix));
    for filter in parts {
        let (name, args) = match filter.split_once(':') {
            Some((name, args)) => (name.trim(), split_top(args, ',')),
            None => (filter.trim(), Vec::new()),
        };
        if name.is_empty() {
            return None;
        }
        let mut call = format!("{prefix}{name} {}", acc.as_arg());
        for arg in args.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            call.push(' ');
            call.push_str(&value(arg, prefix));
        }
        acc = Expr::Call(call);
    }
    Some(acc)
}

/// Translate an `if`/`unless`/`elsif` condition.
pub fn condition(src: &str, prefix: &str) -> Option<Expr> {
    let mut clauses: Vec<Vec<&str>> = vec![Vec::new()];
    let mut connectors = Vec::new();
    for word in split_words(src) {
        if word == "and" || word == "or" {
            connectors.push(word);
            clauses.push(Vec::new());
        } else {
            clauses.last_mut()?.push(word);
        }
    }
    let mut exprs = clauses
        .iter()
        .map(|c| comparison(c, prefix))
        .collect::<Option<Vec<_>>>()?;
    let mut acc = exprs.pop()?;
    while let Some(left) = exprs.pop() {
        let connector = connectors.pop()?;
        acc = Expr::Call(format!(
            "{prefix}{connector} {} {}",
            left.as_arg(),
            acc.as_arg()
        ));
    }
    Some(acc)
}

fn comparison(words: &[&str], prefix: &str) -> Option<Expr> {
    match words {
        [single] => Some(Expr::Value(value(single, prefix))),
        [left, op, right] => {
            let helper = match *op {
                "==" => "eq",
                "!=" | "<>" => "isnt",
                ">" => "gt",
                "<" => "lt",
                ">=" => "gte",
                "<=" => "lte",
                "contains" => "contains",
                _ => return None,
            };
            Some(Expr::Call(format!(
                "{prefix}{helper} {} {}",
                value(left, prefix),
                value(right, prefix)
            )))
        }
        _ => None,
    }
}
