use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=APKPROBE_GIT_REVISION");
    if let Err(e) = write_version_files() {
        panic!("Failed to create version files: {:?}", e);
    }
}

fn out_dir() -> PathBuf {
    PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR set by cargo"))
}

fn write_version_files() -> io::Result<()> {
    let version = env::var("CARGO_PKG_VERSION").expect("CARGO_PKG_VERSION set by cargo");
    let target = env::var("TARGET").expect("TARGET set by cargo");
    let rev = git_rev().unwrap_or_else(|| "unknown".into());

    fs::write(
        out_dir().join("simple_version_string"),
        format!("\"{}\"", version),
    )?;
    fs::write(
        out_dir().join("version_string"),
        format!("r#\"{} ({})\nrev {}\"#", version, target, rev),
    )
}

fn git_rev() -> Option<String> {
    if let Ok(rev) = env::var("APKPROBE_GIT_REVISION") {
        return Some(rev.trim().to_string());
    }
    let out = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8(out.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
