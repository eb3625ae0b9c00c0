use clap::{Parser, Subcommand};
use hekyll::config::{self, DestFn, ErrorPolicy, Options};
use hekyll::pipeline::{PipelineError, RunReport};
use hekyll::{Hekyll, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`warn`, `hekyll=debug`, ...).
const LOG_ENV: &str = "HEKYLL_LOG";

/// Shared flag for commands that write into a subdirectory of the output.
#[derive(clap::Args, Clone)]
struct IntoArgs {
    /// Subdirectory of the output directory to write into
    #[arg(long, value_name = "SUBDIR")]
    into: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "hekyll")]
#[command(version)]
#[command(about = "Convert a Jekyll site into an Assemble site")]
#[command(long_about = "\
Convert a Jekyll site into an Assemble site

Liquid templates become Handlebars templates, markdown and stylesheets are
normalized, and everything else is copied across:

  site/                         dist/
  ├── _config.yml          →    ├── _config.yml
  ├── _layouts/default.html →   ├── _layouts/default.hbs
  ├── _includes/nav.html   →    ├── _includes/nav.hbs
  ├── _posts/2020-hi.md    →    ├── _posts/2020-hi.md
  ├── _sass/base.scss      →    ├── _sass/base.scss
  ├── styles.scss          →    ├── _sass/styles.scss   (+ @import \"custom\")
  │                             ├── _sass/custom.scss
  ├── assets/logo.png      →    ├── assets/logo.png     (byte for byte)
  └── CNAME                →    └── CNAME

Options are read from hekyll.toml in the source directory (or --config).
Run 'hekyll gen-config' to print a documented sample.

Set HEKYLL_LOG=debug for per-file logging.")]
struct Cli {
    /// Source directory
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Output directory [default: dist]
    #[arg(long, global = true)]
    dest: Option<PathBuf>,

    /// Config file [default: <cwd>/hekyll.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum parallel workers (clamped to CPU cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Stop starting new files after the first failure
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log every file processed
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert the whole site: templates, assets, data, styles and text
    Build,
    /// Convert Liquid templates to Handlebars
    Templates {
        /// Glob patterns [default: all html, liquid, markdown and textile files]
        patterns: Vec<String>,
        #[command(flatten)]
        into: IntoArgs,
    },
    /// Copy files, converting templates and trimming whitespace
    Copy {
        /// Glob patterns
        #[arg(required = true)]
        patterns: Vec<String>,
        #[command(flatten)]
        into: IntoArgs,
        /// Append `@import "NAME";` to stylesheets
        #[arg(long, value_name = "NAME")]
        add_import: Option<String>,
    },
    /// Copy files byte for byte
    Assets {
        /// Glob patterns
        #[arg(required = true)]
        patterns: Vec<String>,
        #[command(flatten)]
        into: IntoArgs,
    },
    /// Copy remaining text files, stripping empty front matter
    Text {
        /// Glob patterns [default: everything not handled by other commands]
        patterns: Vec<String>,
        #[command(flatten)]
        into: IntoArgs,
    },
    /// Print a stock hekyll.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let options = resolve_options(&cli)?;
    let cwd = options.cwd.clone();
    let hekyll = Hekyll::new(options);

    let result = match &cli.command {
        Command::Build => hekyll.build(),
        Command::Templates { patterns, into } => hekyll
            .templates(patterns, Options::default(), dest_fn(into))
            .map(|r| vec![r]),
        Command::Copy {
            patterns,
            into,
            add_import,
        } => {
            let options = Options {
                add_import: add_import.clone(),
                ..Options::default()
            };
            hekyll.copy(patterns, options, dest_fn(into)).map(|r| vec![r])
        }
        Command::Assets { patterns, into } => hekyll
            .assets(patterns, Options::default(), dest_fn(into))
            .map(|r| vec![r]),
        Command::Text { patterns, into } => hekyll
            .text(patterns, Options::default(), dest_fn(into))
            .map(|r| vec![r]),
        Command::GenConfig => return Ok(()),
    };

    match result {
        Ok(reports) => print_reports(&cli, &reports)?,
        Err(err) => exit_with(&err, cwd.as_deref()),
    }
    Ok(())
}

/// Filter from `HEKYLL_LOG`, `warn` when unset; `-v` forces `debug`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("hekyll=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Layer the config file and command-line flags into handle options.
fn resolve_options(cli: &Cli) -> Result<Options, config::ConfigError> {
    let cwd = cli.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
    let file = match &cli.config {
        Some(path) => config::load_options(path)?,
        None => config::load_config(&cwd)?,
    };

    let mut flags = Options {
        cwd: cli.cwd.clone(),
        dest_base: cli.dest.clone(),
        threads: cli.threads,
        ..Options::default()
    };
    if cli.fail_fast {
        flags.error_policy = Some(ErrorPolicy::FailFast);
    }

    let mut options = file.merge(flags);
    if options.cwd.is_none() {
        options.cwd = Some(cwd.clone());
    }
    if options.dest_base.is_none() {
        options.dest_base = Some(cwd.join("dist"));
    }
    Ok(options)
}

fn dest_fn(args: &IntoArgs) -> Option<DestFn> {
    Some(match &args.into {
        Some(subdir) => config::into_dest(subdir.clone()),
        None => config::flat_dest(),
    })
}

fn print_reports(cli: &Cli, reports: &[RunReport]) -> Result<(), serde_json::Error> {
    if cli.json {
        println!("{}", output::format_json(reports)?);
        return Ok(());
    }
    for report in reports {
        output::print_run_report(report);
    }
    if let Command::Build = cli.command {
        output::print_build_summary(reports);
    }
    Ok(())
}

fn exit_with(err: &PipelineError, cwd: Option<&Path>) -> ! {
    let cwd = cwd.and_then(|p| std::path::absolute(p).ok());
    output::print_pipeline_error(err, cwd.as_deref());
    std::process::exit(1);
}
