//! Liquid → Handlebars converter.
//!
//! ## Tag mapping
//!
//! | Liquid | Handlebars |
//! |--------|------------|
//! | `{{ a \| f: x }}` | `{{f a x}}` |
//! | `{{ content }}` | `{{{content}}}` |
//! | `{% if c %}` / `{% elsif c %}` / `{% else %}` / `{% endif %}` | `{{#if c}}` / `{{else if c}}` / `{{else}}` / `{{/if}}` |
//! | `{% unless c %}` ... `{% endunless %}` | `{{#unless c}}` ... `{{/unless}}` |
//! | `{% for x in xs limit:2 %}` ... `{% endfor %}` | `{{#each (limit xs 2) as \|x\|}}` ... `{{/each}}` |
//! | `{% case v %}{% when 1 %}` ... `{% endcase %}` | `{{#if (eq v 1)}}` ... `{{/if}}` |
//! | `{% include nav.html k=v %}` | `{{> nav k=v}}` |
//! | `{% assign x = v \| f %}` | `{{assign "x" (f v)}}` |
//! | `{% capture x %}` ... `{% endcapture %}` | `{{#capture "x"}}` ... `{{/capture}}` |
//! | `{% highlight rb %}` ... `{% endhighlight %}` | `{{#highlight "rb"}}` ... `{{/highlight}}` |
//! | `{% comment %}` ... `{% endcomment %}` | `{{!-- ... --}}` |
//! | `{% raw %}` ... `{% endraw %}` | `{{{{raw}}}}` ... `{{{{/raw}}}}` |
//! | `{% other args %}` | `{{other args}}` |
//!
//! Helper names introduced by the converter carry [`ConvertOptions::prefix`];
//! the built-in `if`, `unless`, `each`, `else` and partials do not.
//! Liquid whitespace control (`{%-`, `-}}`) maps to Handlebars `~`.

use super::expr::{self, Expr};
use super::{ConvertError, ConvertOptions, TemplateConverter};
use regex::Regex;
use std::sync::LazyLock;

static END_RAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?\s*endraw\s*-?%\}").expect("valid regex"));

static END_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?\s*endcomment\s*-?%\}").expect("valid regex"));

/// The bundled converter.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiquidConverter;

impl TemplateConverter for LiquidConverter {
    fn convert(&self, text: &str, options: &ConvertOptions) -> Result<String, ConvertError> {
        let (matter, body) = if options.yfm {
            split_front_matter(text)
        } else {
            ("", text)
        };
        let mut out = String::with_capacity(text.len() + text.len() / 8);
        out.push_str(matter);
        let start_line = 1 + matter.matches('\n').count();
        Emitter::new(&options.prefix).run(body, start_line, &mut out)?;
        Ok(out)
    }
}

/// Split a leading `---` front-matter block (delimiters included) from the body.
fn split_front_matter(text: &str) -> (&str, &str) {
    if !text.starts_with("---\n") && !text.starts_with("---\r\n") {
        return ("", text);
    }
    let mut offset = 0;
    for (i, line) in text.split_inclusive('\n').enumerate() {
        offset += line.len();
        if i > 0 && line.trim_end() == "---" {
            return text.split_at(offset);
        }
    }
    ("", text)
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, PartialEq)]
struct Delimited<'a> {
    inner: &'a str,
    trim_left: bool,
    trim_right: bool,
    line: usize,
}

impl Delimited<'_> {
    /// Render `body` inside `{{ }}` with this tag's whitespace control.
    fn mustache(&self, body: &str) -> String {
        format!(
            "{{{{{}{body}{}}}}}",
            if self.trim_left { "~" } else { "" },
            if self.trim_right { "~" } else { "" }
        )
    }

    fn name(&self) -> &str {
        self.inner.split_whitespace().next().unwrap_or("")
    }

    fn args(&self) -> &str {
        let name = self.name();
        self.inner.trim_start()[name.len()..].trim()
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Output(Delimited<'a>),
    Tag(Delimited<'a>),
    Raw(&'a str),
    Comment(&'a str),
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, line: usize) -> Self {
        Self { src, pos: 0, line }
    }

    fn advance(&mut self, n: usize) {
        self.line += self.src[self.pos..self.pos + n].matches('\n').count();
        self.pos += n;
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>, ConvertError> {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return Ok(None);
        }
        match find_open(rest) {
            None => {
                self.advance(rest.len());
                return Ok(Some(Token::Text(rest)));
            }
            Some(at) if at > 0 => {
                self.advance(at);
                return Ok(Some(Token::Text(&rest[..at])));
            }
            Some(_) => {}
        }

        let is_tag = rest.starts_with("{%");
        let close = if is_tag { "%}" } else { "}}" };
        let line = self.line;
        let end = rest[2..]
            .find(close)
            .map(|i| i + 2)
            .ok_or(ConvertError::Unterminated { line })?;
        let (inner, trim_left, trim_right) = strip_trim_markers(&rest[2..end]);
        self.advance(end + 2);
        let tag = Delimited {
            inner,
            trim_left,
            trim_right,
            line,
        };
        if !is_tag {
            return Ok(Some(Token::Output(tag)));
        }
        if tag.name() == "raw" {
            return self
                .body_until(&END_RAW, "raw", line)
                .map(|b| Some(Token::Raw(b)));
        }
        if tag.name() == "comment" {
            return self
                .body_until(&END_COMMENT, "comment", line)
                .map(|b| Some(Token::Comment(b)));
        }
        Ok(Some(Token::Tag(tag)))
    }

    /// Consume verbatim text up to and including the closing tag.
    fn body_until(
        &mut self,
        end: &Regex,
        tag: &str,
        line: usize,
    ) -> Result<&'a str, ConvertError> {
        let rest = &self.src[self.pos..];
        let m = end.find(rest).ok_or_else(|| ConvertError::Unclosed {
            tag: tag.to_string(),
            line,
        })?;
        self.advance(m.end());
        Ok(&rest[..m.start()])
    }
}

/// Offset of the next `{{` or `{%`.
fn find_open(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(off) = s[from..].find('{') {
        let at = from + off;
        if matches!(bytes.get(at + 1), Some(b'{' | b'%')) {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

fn strip_trim_markers(inner: &str) -> (&str, bool, bool) {
    let (inner, left) = match inner.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    let (inner, right) = match inner.strip_suffix('-') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    (inner.trim(), left, right)
}

// ============================================================================
// Emitter
// ============================================================================

#[derive(Debug)]
enum Block {
    If,
    Unless,
    For,
    Capture,
    Highlight,
    Case { subject: String, whens: usize },
}

impl Block {
    fn end_tag(&self) -> &'static str {
        match self {
            Block::If => "endif",
            Block::Unless => "endunless",
            Block::For => "endfor",
            Block::Capture => "endcapture",
            Block::Highlight => "endhighlight",
            Block::Case { .. } => "endcase",
        }
    }

    fn open_tag(&self) -> &'static str {
        self.end_tag().trim_start_matches("end")
    }
}

struct Emitter<'p> {
    prefix: &'p str,
    stack: Vec<(Block, usize)>,
}

impl<'p> Emitter<'p> {
    fn new(prefix: &'p str) -> Self {
        Self {
            prefix,
            stack: Vec::new(),
        }
    }

    fn run(&mut self, src: &str, start_line: usize, out: &mut String) -> Result<(), ConvertError> {
        let mut lexer = Lexer::new(src, start_line);
        while let Some(token) = lexer.next_token()? {
            match token {
                Token::Text(text) => out.push_str(text),
                Token::Output(tag) => out.push_str(&self.output(&tag)?),
                Token::Tag(tag) => out.push_str(&self.tag(&tag)?),
                Token::Raw(body) => {
                    out.push_str("{{{{raw}}}}");
                    out.push_str(body);
                    out.push_str("{{{{/raw}}}}");
                }
                Token::Comment(body) => {
                    out.push_str("{{!--");
                    out.push_str(body);
                    out.push_str("--}}");
                }
            }
        }
        match self.stack.pop() {
            Some((block, line)) => Err(ConvertError::Unclosed {
                tag: block.open_tag().to_string(),
                line,
            }),
            None => Ok(()),
        }
    }

    fn output(&self, tag: &Delimited<'_>) -> Result<String, ConvertError> {
        if tag.inner == "content" {
            return Ok(format!("{{{}}}", tag.mustache("content")));
        }
        let expr = expr::expression(tag.inner, self.prefix).ok_or_else(|| malformed(tag))?;
        Ok(tag.mustache(expr.as_body()))
    }

    fn tag(&mut self, tag: &Delimited<'_>) -> Result<String, ConvertError> {
        let p = self.prefix;
        let args = tag.args();
        let rendered = match tag.name() {
            "if" => {
                let cond = expr::condition(args, p).ok_or_else(|| malformed(tag))?;
                self.open(Block::If, tag);
                tag.mustache(&format!("#if {}", cond.as_arg()))
            }
            "unless" => {
                let cond = expr::condition(args, p).ok_or_else(|| malformed(tag))?;
                self.open(Block::Unless, tag);
                tag.mustache(&format!("#unless {}", cond.as_arg()))
            }
            "elsif" => {
                if !matches!(self.stack.last(), Some((Block::If, _))) {
                    return Err(unexpected(tag));
                }
                let cond = expr::condition(args, p).ok_or_else(|| malformed(tag))?;
                tag.mustache(&format!("else if {}", cond.as_arg()))
            }
            "else" => match self.stack.last() {
                Some((Block::If | Block::Unless | Block::For, _)) => tag.mustache("else"),
                Some((Block::Case { whens, .. }, _)) if *whens > 0 => tag.mustache("else"),
                _ => return Err(unexpected(tag)),
            },
            "for" => {
                let each = self.for_loop(args).ok_or_else(|| malformed(tag))?;
                self.open(Block::For, tag);
                tag.mustache(&each)
            }
            "case" => {
                if args.is_empty() {
                    return Err(malformed(tag));
                }
                let subject = expr::value(args, p);
                self.open(Block::Case { subject, whens: 0 }, tag);
                String::new()
            }
            "when" => {
                let Some((Block::Case { subject, whens }, _)) = self.stack.last_mut() else {
                    return Err(unexpected(tag));
                };
                let cond = when_condition(subject, args, p).ok_or_else(|| malformed(tag))?;
                let keyword = if *whens == 0 { "#if" } else { "else if" };
                *whens += 1;
                tag.mustache(&format!("{keyword} {}", cond.as_arg()))
            }
            "include" => tag.mustache(&include(args, p).ok_or_else(|| malformed(tag))?),
            "assign" => {
                let (name, value) = args.split_once('=').ok_or_else(|| malformed(tag))?;
                let value = expr::expression(value, p).ok_or_else(|| malformed(tag))?;
                tag.mustache(&format!("{p}assign \"{}\" {}", name.trim(), value.as_arg()))
            }
            "capture" => {
                if args.is_empty() {
                    return Err(malformed(tag));
                }
                self.open(Block::Capture, tag);
                tag.mustache(&format!("#{p}capture \"{args}\""))
            }
            "highlight" => {
                let mut words = args.split_whitespace();
                let lang = words.next().ok_or_else(|| malformed(tag))?;
                let mut body = format!("#{p}highlight \"{lang}\"");
                if words.any(|w| w == "linenos") {
                    body.push_str(" linenos=true");
                }
                self.open(Block::Highlight, tag);
                tag.mustache(&body)
            }
            name if name.starts_with("end") => self.close(tag)?,
            "" => return Err(malformed(tag)),
            name if args.is_empty() => tag.mustache(&format!("{p}{name}")),
            name => tag.mustache(&format!("{p}{name} {args}")),
        };
        Ok(rendered)
    }

    fn open(&mut self, block: Block, tag: &Delimited<'_>) {
        self.stack.push((block, tag.line));
    }

    fn close(&mut self, tag: &Delimited<'_>) -> Result<String, ConvertError> {
        let p = self.prefix;
        match self.stack.last() {
            Some((block, _)) if block.end_tag() == tag.name() => {}
            _ => return Err(unexpected(tag)),
        }
        let Some((block, _)) = self.stack.pop() else {
            return Err(unexpected(tag));
        };
        Ok(match block {
            Block::If => tag.mustache("/if"),
            Block::Unless => tag.mustache("/unless"),
            Block::For => tag.mustache("/each"),
            Block::Capture => tag.mustache(&format!("/{p}capture")),
            Block::Highlight => tag.mustache(&format!("/{p}highlight")),
            Block::Case { whens: 0, .. } => String::new(),
            Block::Case { .. } => tag.mustache("/if"),
        })
    }

    /// `x in xs [offset:n] [limit:n] [reversed]` → `#each <coll> as |x|`.
    fn for_loop(&self, args: &str) -> Option<String> {
        let p = self.prefix;
        let words = expr::split_words(args);
        let [var, "in", collection, params @ ..] = words.as_slice() else {
            return None;
        };
        let mut offset = None;
        let mut limit = None;
        let mut reversed = false;
        let mut params = params.iter();
        while let Some(param) = params.next() {
            if *param == "reversed" {
                reversed = true;
                continue;
            }
            let (key, value) = param.split_once(':')?;
            let value = if value.is_empty() {
                *params.next()?
            } else {
                value
            };
            match key {
                "offset" => offset = Some(expr::value(value, p)),
                "limit" => limit = Some(expr::value(value, p)),
                _ => return None,
            }
        }
        let mut coll = expr::value(collection, p);
        if let Some(n) = offset {
            coll = format!("({p}offset {coll} {n})");
        }
        if let Some(n) = limit {
            coll = format!("({p}limit {coll} {n})");
        }
        if reversed {
            coll = format!("({p}reverse {coll})");
        }
        Some(format!("#each {coll} as |{var}|"))
    }
}

/// `when a, b` / `when a or b` against the case subject.
fn when_condition(subject: &str, args: &str, prefix: &str) -> Option<Expr> {
    let values: Vec<&str> = expr::split_top(args, ',')
        .into_iter()
        .flat_map(|part| expr::split_words(part).into_iter().filter(|w| *w != "or"))
        .collect();
    let mut tests = values
        .iter()
        .map(|v| Expr::Call(format!("{prefix}eq {subject} {}", expr::value(v, prefix))));
    let first = tests.next()?;
    Some(tests.fold(first, |acc, next| {
        Expr::Call(format!("{prefix}or {} {}", acc.as_arg(), next.as_arg()))
    }))
}

/// `nav.html key=value` → `> nav key=value`.
fn include(args: &str, prefix: &str) -> Option<String> {
    let words = expr::split_words(args);
    let (file, params) = words.split_first()?;
    let file = file.trim_matches(|c| c == '"' || c == '\'');
    let name = match file.rfind('.') {
        Some(dot) if !file[dot..].contains('/') => &file[..dot],
        _ => file,
    };
    let mut body = format!("> {name}");
    for param in params {
        let (key, value) = param.split_once('=')?;
        body.push_str(&format!(" {key}={}", expr::value(value, prefix)));
    }
    Some(body)
}

fn malformed(tag: &Delimited<'_>) -> ConvertError {
    ConvertError::Malformed {
        tag: tag.inner.to_string(),
        line: tag.line,
    }
}

fn unexpected(tag: &Delimited<'_>) -> ConvertError {
    ConvertError::UnexpectedTag {
        tag: tag.name().to_string(),
        line: tag.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(text: &str) -> String {
        LiquidConverter
            .convert(text, &ConvertOptions::default())
            .unwrap()
    }

    fn convert_err(text: &str) -> ConvertError {
        LiquidConverter
            .convert(text, &ConvertOptions::default())
            .unwrap_err()
    }

    #[test]
    fn plain_text_is_untouched() {
        let text = "<p>no tags { here }</p>\n";
        assert_eq!(convert(text), text);
    }

    #[test]
    fn output_tags() {
        assert_eq!(convert("<h1>{{ page.title }}</h1>"), "<h1>{{page.title}}</h1>");
        assert_eq!(
            convert(r#"{{ post.date | date: "%b %-d, %Y" }}"#),
            r#"{{date post.date "%b %-d, %Y"}}"#
        );
    }

    #[test]
    fn content_is_unescaped() {
        assert_eq!(convert("<main>{{ content }}</main>"), "<main>{{{content}}}</main>");
    }

    #[test]
    fn if_elsif_else() {
        let text = "{% if page.title %}A{% elsif site.title == 'x' %}B{% else %}C{% endif %}";
        assert_eq!(
            convert(text),
            "{{#if page.title}}A{{else if (eq site.title 'x')}}B{{else}}C{{/if}}"
        );
    }

    #[test]
    fn unless_block() {
        assert_eq!(
            convert("{% unless page.hidden %}x{% endunless %}"),
            "{{#unless page.hidden}}x{{/unless}}"
        );
    }

    #[test]
    fn for_loop_with_params() {
        assert_eq!(
            convert("{% for post in site.posts limit:3 offset: 1 %}{{ post.url }}{% endfor %}"),
            "{{#each (limit (offset site.posts 1) 3) as |post|}}{{post.url}}{{/each}}"
        );
        assert_eq!(
            convert("{% for p in paginator.posts reversed %}{% endfor %}"),
            "{{#each (reverse paginator.posts) as |p|}}{{/each}}"
        );
    }

    #[test]
    fn for_else() {
        assert_eq!(
            convert("{% for x in xs %}{{ x }}{% else %}none{% endfor %}"),
            "{{#each xs as |x|}}{{x}}{{else}}none{{/each}}"
        );
    }

    #[test]
    fn case_when() {
        let text = "{% case page.lang %}{% when 'en' %}Hi{% when 'fr', 'ca' %}Salut{% else %}?{% endcase %}";
        assert_eq!(
            convert(text),
            "{{#if (eq page.lang 'en')}}Hi{{else if (or (eq page.lang 'fr') (eq page.lang 'ca'))}}Salut{{else}}?{{/if}}"
        );
    }

    #[test]
    fn include_becomes_partial() {
        assert_eq!(convert("{% include head.html %}"), "{{> head}}");
        assert_eq!(
            convert(r#"{% include note.html type="info" title=page.title %}"#),
            r#"{{> note type="info" title=page.title}}"#
        );
    }

    #[test]
    fn assign_and_capture() {
        assert_eq!(
            convert("{% assign year = post.date | date: '%Y' %}"),
            "{{assign \"year\" (date post.date '%Y')}}"
        );
        assert_eq!(
            convert("{% capture title %}{{ page.title }}{% endcapture %}"),
            "{{#capture \"title\"}}{{page.title}}{{/capture}}"
        );
    }

    #[test]
    fn highlight_block() {
        assert_eq!(
            convert("{% highlight ruby linenos %}def x; end{% endhighlight %}"),
            "{{#highlight \"ruby\" linenos=true}}def x; end{{/highlight}}"
        );
    }

    #[test]
    fn raw_and_comment_bodies_are_verbatim() {
        assert_eq!(
            convert("{% raw %}{{ keep }}{% if %}{% endraw %}"),
            "{{{{raw}}}}{{ keep }}{% if %}{{{{/raw}}}}"
        );
        assert_eq!(
            convert("{% comment %} {{ x }} {% endcomment %}"),
            "{{!-- {{ x }} --}}"
        );
    }

    #[test]
    fn whitespace_control() {
        assert_eq!(
            convert("{%- if a -%}x{%- endif -%}{{- b -}}"),
            "{{~#if a~}}x{{~/if~}}{{~b~}}"
        );
    }

    #[test]
    fn unknown_tags_become_helpers() {
        assert_eq!(convert("{% seo %}"), "{{seo}}");
        assert_eq!(convert("{% post_url 2010-07-21-name %}"), "{{post_url 2010-07-21-name}}");
    }

    #[test]
    fn prefix_applies_to_helpers_only() {
        let opts = ConvertOptions::with_prefix("@");
        let out = LiquidConverter
            .convert(
                "{% if a == b %}{{ x | upcase }}{% include f.html %}{% seo %}{% endif %}",
                &opts,
            )
            .unwrap();
        assert_eq!(out, "{{#if (@eq a b)}}{{@upcase x}}{{> f}}{{@seo}}{{/if}}");
    }

    #[test]
    fn front_matter_is_preserved_with_yfm() {
        let text = "---\ntitle: \"{{ not converted }}\"\n---\n{{ page.title }}\n";
        assert_eq!(
            convert(text),
            "---\ntitle: \"{{ not converted }}\"\n---\n{{page.title}}\n"
        );
    }

    #[test]
    fn front_matter_is_converted_without_yfm() {
        let opts = ConvertOptions::default().without_yfm();
        let out = LiquidConverter
            .convert("---\nx: {{ a }}\n---\n", &opts)
            .unwrap();
        assert_eq!(out, "---\nx: {{a}}\n---\n");
    }

    #[test]
    fn unterminated_tag_reports_line() {
        assert!(matches!(
            convert_err("a\nb\n{% if x\n"),
            ConvertError::Unterminated { line: 3 }
        ));
        assert!(matches!(
            convert_err("{{ page.title"),
            ConvertError::Unterminated { line: 1 }
        ));
    }

    #[test]
    fn stray_end_tag_is_rejected() {
        assert!(matches!(
            convert_err("x\n{% endif %}"),
            ConvertError::UnexpectedTag { ref tag, line: 2 } if tag == "endif"
        ));
        assert!(matches!(
            convert_err("{% if a %}{% endfor %}"),
            ConvertError::UnexpectedTag { .. }
        ));
        assert!(matches!(
            convert_err("{% else %}"),
            ConvertError::UnexpectedTag { .. }
        ));
    }

    #[test]
    fn unclosed_block_is_rejected() {
        assert!(matches!(
            convert_err("\n{% for x in xs %}"),
            ConvertError::Unclosed { ref tag, line: 2 } if tag == "for"
        ));
        assert!(matches!(
            convert_err("{% raw %}never ends"),
            ConvertError::Unclosed { ref tag, .. } if tag == "raw"
        ));
    }

    #[test]
    fn line_numbers_account_for_front_matter() {
        assert!(matches!(
            convert_err("---\na: 1\n---\n\n{% endif %}"),
            ConvertError::UnexpectedTag { line: 5, .. }
        ));
    }

    #[test]
    fn malformed_tags() {
        assert!(matches!(
            convert_err("{% for x %}{% endfor %}"),
            ConvertError::Malformed { .. }
        ));
        assert!(matches!(convert_err("{{ }}"), ConvertError::Malformed { .. }));
        assert!(matches!(convert_err("{% assign x %}"), ConvertError::Malformed { .. }));
    }
}
