// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs,
    io::{BufRead, BufReader, Write},
    net::TcpListener,
    path::PathBuf,
    thread::{self, JoinHandle}
};

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;
use vet_api::{
    manifest_fixtures::{FixtureApk, FixtureLabel, FixtureTable},
    sign_fixtures
};

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("vet").unwrap();
    for var in ["VET_STORE_LANG", "VET_STORE_COUNTRY", "VET_STORE_TIMEOUT_SECS", "VET_STORE_URL"] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_apk(dir: &TempDir, name: &str, apk: &FixtureApk) -> PathBuf {
    let unsigned = apk.build().unwrap();
    let certificate = sign_fixtures::generate_certificate("Example Release", "Example Inc.");
    let signed = sign_fixtures::sign_apk(&unsigned, true, false, &[certificate]).unwrap();
    let path = dir.path().join(name);
    fs::write(&path, signed).unwrap();
    path
}

fn notes_apk(dir: &TempDir) -> PathBuf {
    let mut apk = FixtureApk::new("com.example.notes", "", "2.1.0");
    apk.label = FixtureLabel::Resource(FixtureTable::localized(&[("", "Notes"), ("fr", "Bloc-notes")]));
    apk.permissions = vec!["android.permission.INTERNET".into()];
    write_apk(dir, "notes.apk", &apk)
}

// Answers every request with 404 until `requests` have been served
fn not_found_store(requests: usize) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let mut seen = vec![];
        for _ in 0..requests {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
            seen.push(request_line);
        }
        seen
    });
    (url, handle)
}

#[test]
fn inspect_prints_details() {
    let dir = TempDir::new().unwrap();
    let apk = notes_apk(&dir);
    cmd()
        .arg("inspect")
        .arg(&apk)
        .assert()
        .success()
        .stdout(contains("Package:     com.example.notes"))
        .stdout(contains("App Name:    Notes"))
        .stdout(contains("fr: Bloc-notes"))
        .stdout(contains("android.permission.INTERNET"))
        .stdout(contains("v2 (APK Signature Scheme v2)"));
}

#[test]
fn inspect_raw_prints_manifest() {
    let dir = TempDir::new().unwrap();
    let apk = notes_apk(&dir);
    cmd()
        .args(["inspect", "--raw"])
        .arg(&apk)
        .assert()
        .success()
        .stdout(contains("AndroidManifest.xml:"))
        .stdout(contains("<manifest"))
        .stdout(contains("package=\"com.example.notes\""));
}

#[test]
fn inspect_json() {
    let dir = TempDir::new().unwrap();
    let apk = notes_apk(&dir);
    let output = cmd()
        .args(["--json", "inspect"])
        .arg(&apk)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["details"]["package_name"], "com.example.notes");
    assert_eq!(json["details"]["labels"]["fr"], "Bloc-notes");
    assert!(json["certificates"]["found"][0]["sha256_fingerprint"].is_string());
    assert!(json.get("manifest").is_none());
}

#[test]
fn missing_file_fails() {
    let dir = TempDir::new().unwrap();
    cmd()
        .arg("inspect")
        .arg(dir.path().join("nothing.apk"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Could not read"));
}

#[test]
fn verify_incomplete_apk_fails_before_going_online() {
    let dir = TempDir::new().unwrap();
    let apk = write_apk(
        &dir,
        "broken.apk",
        &FixtureApk {
            package_name: Some("com.example.broken".into()),
            ..Default::default()
        }
    );
    cmd()
        .arg("verify")
        .arg(&apk)
        .args(["--store-url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Could not extract essential details"))
        .stderr(contains("app name, version"));
}

#[test]
fn verify_unknown_package_searches() {
    let dir = TempDir::new().unwrap();
    let apk = notes_apk(&dir);
    let (url, store) = not_found_store(2);
    cmd()
        .arg("verify")
        .arg(&apk)
        .env("VET_STORE_URL", &url)
        .env("VET_STORE_COUNTRY", "gb")
        .assert()
        .success()
        .stdout(contains("APK: Notes (com.example.notes) version 2.1.0"))
        .stdout(contains("(score 50)"))
        .stdout(contains("No similar apps found on the Play Store."));

    let requests = store.join().unwrap();
    assert!(requests[0].starts_with("GET /store/apps/details?id=com.example.notes"));
    assert!(requests[0].contains("gl=gb"));
    assert!(requests[1].starts_with("GET /store/search?q=Notes"));
}

#[test]
fn verify_unreachable_store_still_reports() {
    let dir = TempDir::new().unwrap();
    let apk = notes_apk(&dir);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let output = cmd()
        .args(["--json", "verify"])
        .arg(&apk)
        .args(["--store-url", &url, "--timeout-secs", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).unwrap();
    assert!(json["outcome"]["OrchestratorError"]["message"].is_string());
}
