//! The `Hekyll` handle: base options plus the four operations and `build`.
//!
//! A handle carries options shared by every call and the converter used by
//! `templates` and `copy`. Each call layers its own options on top:
//!
//! ```text
//! Options::stock() ← handle options ← call options (+ call patterns)
//! ```
//!
//! ## Full-site build
//!
//! [`Hekyll::build`] converts a whole Jekyll site in fixed order, stopping at
//! the first failing step:
//!
//! | # | Step | Patterns | Into |
//! |---|------|----------|------|
//! | 1 | templates | defaults or handle `patterns` | |
//! | 2 | assets | `{assets,public}/**` | |
//! | 3 | copy | `**/*.{xml,txt}` | |
//! | 4 | copy | `_config.yml` | |
//! | 5 | copy | `_data/**` | `_data` |
//! | 6 | copy | `_sass/**` | `_sass` |
//! | 7 | copy + `@import "custom"` | `styles.scss` | `_sass` |
//! | 8 | bundled `custom.scss` partial | | `_sass` |
//! | 9 | text | defaults | |

use crate::config::{DestFn, Options, flat_dest, into_dest};
use crate::convert::{LiquidConverter, TemplateConverter};
use crate::pipeline::{self, FileError, Operation, PipelineError, RunReport, WrittenFile};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Stylesheet partial emitted by [`Hekyll::build`] as `_sass/custom.scss`.
pub const CUSTOM_SCSS: &str = include_str!("../static/custom.scss");

pub struct Hekyll<C = LiquidConverter> {
    options: Options,
    converter: C,
}

impl Hekyll<LiquidConverter> {
    pub fn new(options: Options) -> Self {
        Self::with_converter(options, LiquidConverter)
    }
}

impl<C: TemplateConverter> Hekyll<C> {
    pub fn with_converter(options: Options, converter: C) -> Self {
        Self { options, converter }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Convert Liquid templates to Handlebars.
    ///
    /// An empty `patterns` slice selects the configured or default
    /// template patterns.
    pub fn templates<S: AsRef<str>>(
        &self,
        patterns: &[S],
        options: Options,
        dest: Option<DestFn>,
    ) -> Result<RunReport, PipelineError> {
        self.run(Operation::Templates, patterns, options, dest)
    }

    /// Copy files, converting templates and normalizing whitespace.
    pub fn copy<S: AsRef<str>>(
        &self,
        patterns: &[S],
        options: Options,
        dest: Option<DestFn>,
    ) -> Result<RunReport, PipelineError> {
        self.run(Operation::Copy, patterns, options, dest)
    }

    /// Copy files byte for byte.
    pub fn assets<S: AsRef<str>>(
        &self,
        patterns: &[S],
        options: Options,
        dest: Option<DestFn>,
    ) -> Result<RunReport, PipelineError> {
        self.run(Operation::Assets, patterns, options, dest)
    }

    /// Copy everything the other operations leave behind, stripping empty
    /// front matter.
    pub fn text<S: AsRef<str>>(
        &self,
        patterns: &[S],
        options: Options,
        dest: Option<DestFn>,
    ) -> Result<RunReport, PipelineError> {
        self.run(Operation::Text, patterns, options, dest)
    }

    pub fn run<S: AsRef<str>>(
        &self,
        operation: Operation,
        patterns: &[S],
        options: Options,
        dest: Option<DestFn>,
    ) -> Result<RunReport, PipelineError> {
        let mut merged = Options::stock().merge(self.options.clone()).merge(options);
        if !patterns.is_empty() {
            merged.patterns = Some(patterns.iter().map(|p| p.as_ref().to_string()).collect());
        }
        let settings = merged.resolve(dest)?;
        pipeline::run(operation, &settings, &self.converter)
    }

    /// Convert a complete Jekyll site. Returns one report per step.
    pub fn build(&self) -> Result<Vec<RunReport>, PipelineError> {
        let none: &[&str] = &[];
        let defaults = Options::default;
        let mut reports = Vec::new();

        let mut step = |name: &str,
                        result: Result<RunReport, PipelineError>|
         -> Result<(), PipelineError> {
            let report = result?;
            info!(step = name, written = report.written.len(), "build step done");
            reports.push(report);
            Ok(())
        };

        step("templates", self.templates(none, defaults(), Some(flat_dest())))?;
        step("assets", self.assets(&["{assets,public}/**"], defaults(), Some(flat_dest())))?;
        step("xml+txt", self.copy(&["**/*.{xml,txt}"], defaults(), Some(flat_dest())))?;
        step("config", self.copy(&["_config.yml"], defaults(), Some(flat_dest())))?;
        step("data", self.copy(&["_data/**"], defaults(), Some(into_dest("_data"))))?;
        step("sass", self.copy(&["_sass/**"], defaults(), Some(into_dest("_sass"))))?;
        step(
            "styles",
            self.copy(
                &["styles.scss"],
                defaults().with_add_import("custom"),
                Some(into_dest("_sass")),
            ),
        )?;
        step("custom.scss", self.write_custom_scss())?;
        step(
            "text",
            self.text(pipeline::TEXT_PATTERNS, defaults(), Some(flat_dest())),
        )?;

        Ok(reports)
    }

    /// Write the bundled partial to `<dest_base>/_sass/custom.scss`.
    fn write_custom_scss(&self) -> Result<RunReport, PipelineError> {
        let settings = Options::stock()
            .merge(self.options.clone())
            .resolve(Some(flat_dest()))?;
        let source = PathBuf::from("custom.scss");
        let target = settings.dest_base.join("_sass").join(&source);
        let fail = |e: std::io::Error| PipelineError::File(FileError {
            path: source.clone(),
            stage: "write",
            kind: pipeline::FileErrorKind::Filesystem(e),
        });

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        fs::write(&target, CUSTOM_SCSS).map_err(fail)?;
        Ok(RunReport {
            operation: Operation::Copy,
            cwd: settings.cwd,
            dest_base: settings.dest_base,
            written: vec![WrittenFile {
                source,
                dest: target,
                directory: false,
                bytes: CUSTOM_SCSS.len() as u64,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::test_helpers::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn handle<C: TemplateConverter>(src: &Path, out: &Path, converter: C) -> Hekyll<C> {
        Hekyll::with_converter(
            Options::default()
                .with_cwd(src)
                .with_dest_base(out)
                .with_threads(2),
            converter,
        )
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn call_options_override_handle_options() {
        let src = SourceTree::new().file("a.scss", "a{}").build();
        let out = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let hekyll = handle(src.path(), out.path(), EchoConverter);
        hekyll
            .copy(
                &["*.scss"],
                Options::default().with_dest_base(other.path()),
                Some(flat_dest()),
            )
            .unwrap();
        assert!(other.path().join("a.scss").exists());
        assert!(!out.path().join("a.scss").exists());
    }

    #[test]
    fn call_patterns_override_option_patterns() {
        let src = SourceTree::new().file("a.txt", "a").file("b.txt", "b").build();
        let out = TempDir::new().unwrap();
        let hekyll = handle(src.path(), out.path(), EchoConverter);
        let report = hekyll
            .copy(
                &["b.txt"],
                Options::default().with_patterns(["a.txt"]),
                Some(flat_dest()),
            )
            .unwrap();
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.written[0].source, Path::new("b.txt"));
    }

    #[test]
    fn missing_dest_fn_is_config_error() {
        let src = SourceTree::new().file("a.txt", "a").build();
        let out = TempDir::new().unwrap();
        let hekyll = handle(src.path(), out.path(), EchoConverter);
        let err = hekyll.assets(&["*"], Options::default(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::Missing("dest"))));
    }

    #[test]
    fn missing_dest_base_touches_nothing() {
        let src = SourceTree::new().file("a.html", "{{ x }}").build();
        let hekyll = Hekyll::with_converter(
            Options::default().with_cwd(src.path()),
            RecordingConverter::default(),
        );
        let err = hekyll
            .templates(&["*.html"], Options::default(), Some(flat_dest()))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::Missing("dest_base"))
        ));
        assert!(hekyll.converter.calls().is_empty());
    }

    #[test]
    fn templates_with_liquid_converter() {
        let src = SourceTree::new()
            .file(
                "_layouts/default.html",
                "<html>\n  {% if page.title %}<h1>{{ page.title }}</h1>{% endif %}\n  {{ content }}\n</html>\n",
            )
            .build();
        let out = TempDir::new().unwrap();
        let hekyll = Hekyll::new(
            Options::default()
                .with_cwd(src.path())
                .with_dest_base(out.path()),
        );
        hekyll
            .templates(&[] as &[&str], Options::default(), Some(flat_dest()))
            .unwrap();
        assert_eq!(
            read(&out.path().join("_layouts/default.hbs")),
            "{{#frame page=page site=site}}\n<html>\n  {{#if page.title}}<h1>{{page.title}}</h1>{{/if}}\n  {{{content}}}\n</html>\n{{/frame}}\n"
        );
    }

    #[test]
    fn build_converts_a_site() {
        let src = SourceTree::new()
            .file("index.html", "---\nlayout: default\n---\n<p>{{ site.title }}</p>\n")
            .file("_includes/nav.html", "<nav>{{ page.url }}</nav>")
            .file("feed.xml", "<feed>{{ site.url }}</feed>\n\n")
            .file("robots.txt", "User-agent: *\n")
            .file("_config.yml", "title: Demo\n")
            .file("_data/nav.yml", "- home\n")
            .file("_sass/_base.scss", "body { margin: 0; }\n")
            .file("styles.scss", "---\n---\n@import \"base\";\n")
            .bytes("assets/logo.png", &[0x89, b'P', b'N', b'G', 0, 0])
            .file("CNAME", "example.com\n")
            .file("Gemfile", "source 'https://rubygems.org'\n")
            .file("README.md", "# Demo\n")
            .build();
        let out = TempDir::new().unwrap();
        let hekyll = handle(src.path(), out.path(), EchoConverter);
        let reports = hekyll.build().unwrap();
        assert_eq!(reports.len(), 9);

        let o = out.path();
        assert_eq!(
            read(&o.join("index.hbs")),
            "---\nlayout: default\n---\n<p>{{ site.title }}</p>\n"
        );
        assert!(read(&o.join("_includes/nav.hbs")).starts_with("{{#frame page=page site=site}}"));
        assert_eq!(
            read(&o.join("feed.xml")),
            "{{#frame page=page site=site}}\n<feed>{{ site.url }}</feed>\n{{/frame}}\n"
        );
        assert_eq!(read(&o.join("robots.txt")), "User-agent: *\n");
        assert_eq!(read(&o.join("_config.yml")), "title: Demo\n");
        assert_eq!(read(&o.join("_data/nav.yml")), "- home\n");
        assert_eq!(read(&o.join("_sass/_base.scss")), "body { margin: 0; }\n");
        assert_eq!(
            read(&o.join("_sass/styles.scss")),
            "@import \"base\";\n@import \"custom\";\n"
        );
        assert_eq!(read(&o.join("_sass/custom.scss")), CUSTOM_SCSS);
        assert_eq!(
            fs::read(o.join("assets/logo.png")).unwrap(),
            [0x89, b'P', b'N', b'G', 0, 0]
        );
        assert_eq!(read(&o.join("CNAME")), "example.com\n");
        assert!(!o.join("Gemfile").exists());
        assert!(!o.join("README.md").exists());
        assert!(!o.join("styles.scss").exists());
    }

    #[test]
    fn build_stops_at_first_failing_step() {
        let src = SourceTree::new()
            .file("index.html", "FAIL")
            .file("feed.xml", "<feed/>")
            .build();
        let out = TempDir::new().unwrap();
        let hekyll = handle(src.path(), out.path(), FailingConverter);
        let err = hekyll.build().unwrap_err();
        assert_eq!(err.file_errors().len(), 1);
        assert!(!out.path().join("feed.xml").exists());
        assert!(!out.path().join("_sass/custom.scss").exists());
    }
}
