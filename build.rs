//! Stamps the binary with its build date, time and git revision.
//!
//! `SOURCE_DATE_EPOCH` (reproducible builds) wins over the wall clock.

use std::process::Command;

/// Trimmed stdout of `program`, or None if it did not run or failed.
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn build_timestamp() -> (String, String) {
    let epoch = std::env::var("SOURCE_DATE_EPOCH").ok();
    let date_arg = |fmt: &str| match &epoch {
        Some(secs) => vec!["-u".to_string(), "-d".to_string(), format!("@{secs}"), fmt.to_string()],
        None => vec![fmt.to_string()],
    };
    let run = |fmt: &str| {
        let args = date_arg(fmt);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        capture("date", &args)
    };
    (
        run("+%Y-%m-%d").unwrap_or_else(|| "unknown".to_string()),
        run("+%H:%M:%S").unwrap_or_default(),
    )
}

fn main() {
    let (date, time) = build_timestamp();
    let revision = capture("git", &["describe", "--always", "--dirty", "--abbrev=8"])
        .unwrap_or_else(|| "unknown".to_string());

    for (key, value) in [("BUILD_DATE", date), ("BUILD_TIME", time), ("GIT_HASH", revision)] {
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
}
