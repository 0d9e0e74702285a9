use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn bin_path() -> PathBuf {
    if let Some(path) = env::var_os("CARGO_BIN_EXE_saxmark") {
        return PathBuf::from(path);
    }
    let exe = env::current_exe().expect("current exe");
    let mut dir = exe.as_path();
    while let Some(parent) = dir.parent() {
        if parent.file_name().and_then(|name| name.to_str()) == Some("debug") {
            let candidate = parent.join("saxmark");
            if candidate.exists() {
                return candidate;
            }
        }
        dir = parent;
    }
    panic!("binary path missing");
}

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let mut path = env::temp_dir();
    path.push(format!("saxmark_cli_{name}_{}.md", std::process::id()));
    fs::write(&path, contents).expect("write temp file");
    path
}

#[test]
fn prints_an_event_trace_for_a_document() {
    let path = temp_file("trace", "# Title\n\nbody *text*\n");
    let output = Command::new(bin_path())
        .arg(&path)
        .output()
        .expect("run saxmark");
    fs::remove_file(&path).ok();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("<document>"), "got: {stdout}");
    assert!(stdout.contains("<heading level=\"1\">"), "got: {stdout}");
    assert!(stdout.contains("<emphasis>"), "got: {stdout}");
    assert!(stdout.trim_end().ends_with("</document>"), "got: {stdout}");
}

#[test]
fn gfm_breaks_flag_changes_line_break_events() {
    let path = temp_file("gfm", "a\nb\n");
    let output = Command::new(bin_path())
        .arg("--gfm-breaks")
        .arg(&path)
        .output()
        .expect("run saxmark");
    fs::remove_file(&path).ok();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<hard-line-break>"), "got: {stdout}");
}

#[test]
fn rejects_extra_arguments() {
    let output = Command::new(bin_path())
        .args(["one.md", "two.md"])
        .output()
        .expect("run saxmark");
    assert_eq!(output.status.code(), Some(2));
}
