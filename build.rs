use std::process::Command;

/// `git describe` の結果。git が無い/リポジトリ外なら None
fn git_describe() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let desc = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!desc.is_empty()).then_some(desc)
}

fn main() {
    for path in [".git/HEAD", ".git/index", ".git/refs/tags"] {
        println!("cargo:rerun-if-changed={}", path);
    }

    let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match git_describe() {
        Some(desc) => format!("{} ({})", pkg, desc),
        None => pkg,
    };
    println!("cargo:rustc-env=GIT_VERSION={}", version);
}
