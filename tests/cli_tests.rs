//! Command-line workflows run against the built binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use assert_fs::prelude::*;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Run the binary with an isolated config file and log directory.
fn run(temp: &assert_fs::TempDir, args: &[&str]) -> Output {
    let config = temp.child("config.toml");
    if !config.path().exists() {
        let cache = temp.child("cache");
        config
            .write_str(&format!(
                "[general]\ncache_dir = {:?}\n",
                cache.path().display().to_string()
            ))
            .unwrap();
    }
    Command::new(env!("CARGO_BIN_EXE_mboxcontacts"))
        .args(args)
        .current_dir(temp.path())
        .env("MBOXCONTACTS_CONFIG", config.path())
        .env_remove("MBOXCONTACTS_OUTPUT")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exit {:?}\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_extract_then_clean_with_domain_flag_only() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mbox = fixture("sent.mbox");
    let out = temp.child("out");

    let extract = run(
        &temp,
        &[
            "extract",
            mbox.to_str().unwrap(),
            "--internal-domain",
            "allfed.info",
            "-o",
            out.path().to_str().unwrap(),
        ],
    );
    assert_success(&extract);
    out.child("contacts.json")
        .assert(predicate::str::contains("alice@agriculture.gov.au"));

    // No internal domains in the config file: clean must still run.
    let table = out.child("contacts.json");
    let clean = run(&temp, &["clean", table.path().to_str().unwrap()]);
    assert_success(&clean);
    out.child("cleaned")
        .child("contacts.json")
        .assert(predicate::str::contains("carol@resilience.edu.au"));
    assert!(String::from_utf8_lossy(&clean.stdout).contains("Final contacts:"));
}

#[test]
fn test_extract_without_internal_domain_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mbox = fixture("sent.mbox");
    let output = run(&temp, &["extract", mbox.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("domains.internal"));
}
