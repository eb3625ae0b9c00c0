//! Command-line tests: run the built binary against throwaway site trees.
//!
//! Run with: `cargo test --test cli`

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn hekyll(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hekyll"))
        .args(args)
        .env_remove("HEKYLL_LOG")
        .output()
        .expect("failed to run hekyll")
}

fn site(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, text) in files {
        let path = tmp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }
    tmp
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn gen_config_prints_stock_config() {
    let output = hekyll(&["gen-config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("# Hekyll Configuration"));
    assert!(stdout.contains("error_policy = \"collect\""));
}

#[test]
fn build_writes_site_and_summary() {
    let src = site(&[
        ("index.html", "<p>{{ site.title }}</p>\n"),
        ("_config.yml", "title: Demo\n"),
        ("CNAME", "example.com\n"),
    ]);
    let out = TempDir::new().unwrap();
    let output = hekyll(&[
        "--cwd",
        path_arg(src.path()),
        "--dest",
        path_arg(out.path()),
        "build",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.lines().any(|l| l.starts_with("templates (1 file)")));
    assert!(stdout.lines().last().unwrap().starts_with("Wrote "));
    assert_eq!(
        fs::read_to_string(out.path().join("index.hbs")).unwrap(),
        "{{#frame page=page site=site}}\n<p>{{site.title}}</p>\n{{/frame}}\n"
    );
    assert!(out.path().join("_sass/custom.scss").is_file());
}

#[test]
fn dest_defaults_to_dist_inside_cwd() {
    let src = site(&[("CNAME", "example.com\n"), ("hekyll.toml", "threads = 1\n")]);
    let output = hekyll(&["--cwd", path_arg(src.path()), "text"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(src.path().join("dist/CNAME").is_file());
    assert!(!src.path().join("dist/hekyll.toml").exists());
    assert!(!src.path().join("dist/dist").exists());
}

#[test]
fn copy_into_with_import() {
    let src = site(&[("styles.scss", "@import \"base\";\n")]);
    let out = TempDir::new().unwrap();
    let output = hekyll(&[
        "copy",
        "styles.scss",
        "--into",
        "_sass",
        "--add-import",
        "custom",
        "--cwd",
        path_arg(src.path()),
        "--dest",
        path_arg(out.path()),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(out.path().join("_sass/styles.scss")).unwrap(),
        "@import \"base\";\n@import \"custom\";\n"
    );
}

#[test]
fn json_report() {
    let src = site(&[("a.txt", "a\n")]);
    let out = TempDir::new().unwrap();
    let output = hekyll(&[
        "--json",
        "--cwd",
        path_arg(src.path()),
        "--dest",
        path_arg(out.path()),
        "copy",
        "*.txt",
    ]);
    assert!(output.status.success());
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["operation"], "copy");
    assert_eq!(reports[0]["written"][0]["source"], "a.txt");
}

#[test]
fn broken_template_exits_nonzero_with_stage() {
    let src = site(&[
        ("_layouts/post.html", "<p>\n{% if page.title %}\n"),
        ("index.html", "<p>ok</p>\n"),
    ]);
    let out = TempDir::new().unwrap();
    let output = hekyll(&[
        "--cwd",
        path_arg(src.path()),
        "--dest",
        path_arg(out.path()),
        "templates",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("1 file(s) failed"));
    assert!(stderr.contains("_layouts/post.html"));
    assert!(stderr.contains("Stage: convert"));
    assert!(out.path().join("index.hbs").is_file());
}

#[test]
fn copy_requires_patterns() {
    let output = hekyll(&["copy"]);
    assert!(!output.status.success());
}
