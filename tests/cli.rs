mod common;

use assert_cmd::prelude::*;
use common::{fake_relay, post, AUTHOR_HEX, AUTHOR_NPUB};
use std::{fs, process::Command};
use tempfile::TempDir;

fn write_env(dir: &TempDir, relays: &str) -> String {
    let env_path = dir.path().join("env");
    fs::write(
        &env_path,
        format!("RELAYS={relays}\nRELAY_TIMEOUT_SECS=5\nPING_INTERVAL_SECS=0\n"),
    )
    .unwrap();
    env_path.to_str().unwrap().to_string()
}

#[test]
fn help_lists_commands() {
    let out = Command::cargo_bin("relayfeed")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    for cmd in ["fetch", "profile", "decode", "encode"] {
        assert!(text.contains(cmd), "missing {cmd} in help");
    }
}

#[test]
fn decode_and_encode_identifiers() {
    let out = Command::cargo_bin("relayfeed")
        .unwrap()
        .args(["decode", &format!("nostr:{AUTHOR_NPUB}")])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap().trim(), AUTHOR_HEX);

    let out = Command::cargo_bin("relayfeed")
        .unwrap()
        .args(["encode", AUTHOR_HEX])
        .output()
        .unwrap();
    assert!(out.status.success());
    let encoded = String::from_utf8(out.stdout).unwrap();
    assert!(AUTHOR_NPUB.starts_with(encoded.trim()));
    assert_eq!(encoded.trim().len(), AUTHOR_NPUB.len() - 6);
}

#[test]
fn rejects_bad_input() {
    Command::cargo_bin("relayfeed")
        .unwrap()
        .args(["decode", "alice@example.com"])
        .assert()
        .failure();
    Command::cargo_bin("relayfeed")
        .unwrap()
        .args(["encode", "abcd"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_prints_feed_json() {
    let relay = fake_relay(vec![post("e1", "Hello", "<p>Hi &amp; welcome</p>")]).await;
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, &format!("{relay},ws://127.0.0.1:1"));

    let out = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("relayfeed")
            .unwrap()
            .args(["--env", &env_path, "fetch", AUTHOR_NPUB])
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let feed: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(feed["posts"][0]["title"], "Hello");
    assert_eq!(feed["posts"][0]["description"], "Hi & welcome");
    assert_eq!(feed["posts"][0]["link"], "nostr:e1");
    assert_eq!(feed["name"], "7e7e9c42…df4e");
}
