//! End-to-end tests against a real SFTP server.
//!
//! These are marked `#[ignore]` so they don't run in normal `cargo test`.
//! Run them with `cargo test -- --ignored` and these environment variables:
//! - SFTP_TEST_HOST: hostname or IP of the test server (optionally `host:port`)
//! - SFTP_TEST_USER: SSH username
//! - SFTP_TEST_KEY: private key file accepted by the server
//! - SFTP_TEST_PATH: writable base directory on the server (e.g., /tmp/sftpflow-test)

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

struct Server {
    config: TempDir,
    base: String,
}

impl Server {
    /// Save a profile for the test server into a fresh config dir.
    fn from_env() -> Self {
        let host = std::env::var("SFTP_TEST_HOST").expect("SFTP_TEST_HOST not set");
        let user = std::env::var("SFTP_TEST_USER").expect("SFTP_TEST_USER not set");
        let key = std::env::var("SFTP_TEST_KEY").expect("SFTP_TEST_KEY not set");
        let base =
            std::env::var("SFTP_TEST_PATH").unwrap_or_else(|_| "/tmp/sftpflow-test".to_string());

        let server = Server {
            config: TempDir::new().unwrap(),
            base,
        };
        let target = format!("sftp://{}@{}", user, host);
        server
            .cmd()
            .args(["profile", "add", "test", target.as_str()])
            .args(["--key", key.as_str(), "--no-keyboard"])
            .assert()
            .success();
        server
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("sftpflow").expect("sftpflow binary not found");
        cmd.arg("--config-dir").arg(self.config.path());
        cmd
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{}", self.base.trim_end_matches('/'), name)
    }

    /// Run one operation and parse the JSON result.
    fn run(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .arg("run")
            .args(args)
            .args(["--profile", "test"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("run prints one JSON document")
    }
}

#[test]
#[ignore] // Requires SFTP server: SFTP_TEST_HOST, SFTP_TEST_USER, SFTP_TEST_KEY, SFTP_TEST_PATH
fn upload_stat_download_delete_roundtrip() {
    let server = Server::from_env();
    let local = TempDir::new().unwrap();
    let source = local.path().join("upload.txt");
    let content = "Hello from the sftpflow integration test!";
    fs::write(&source, content).unwrap();

    let base = server.base.clone();
    server.run(&["mkdir", &base, "--recursive"]);

    let remote = server.path("roundtrip.txt");
    let put = server.run(&["put", &remote, "--local", source.to_str().unwrap()]);
    assert_eq!(put["payload"]["success"], true);
    assert_eq!(put["sftp"]["operation"], "put");

    let exists = server.run(&["exists", &remote]);
    assert_eq!(exists["payload"], "-");
    assert_eq!(exists["exists"], true);

    let stat = server.run(&["stat", &remote]);
    assert_eq!(stat["payload"]["size"], content.len() as u64);
    assert_eq!(stat["payload"]["isFile"], true);

    let downloaded = local.path().join("downloaded.txt");
    server.run(&["get", &remote, "--local", downloaded.to_str().unwrap()]);
    assert_eq!(fs::read_to_string(&downloaded).unwrap(), content);

    server.run(&["delete", &remote]);
    let gone = server.run(&["exists", &remote]);
    assert_eq!(gone["payload"], false);
    assert_eq!(gone["exists"], false);
}

#[test]
#[ignore] // Requires SFTP server: SFTP_TEST_HOST, SFTP_TEST_USER, SFTP_TEST_KEY, SFTP_TEST_PATH
fn recursive_mkdir_list_rename_rmdir() {
    let server = Server::from_env();

    let tree = server.path("tree");
    let nested = format!("{}/a/b", tree);
    server.run(&["mkdir", &nested, "--recursive"]);

    let listing = server.run(&["list", &format!("{}/a", tree)]);
    let entries = listing["payload"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "b");
    assert_eq!(entries[0]["type"], "d");

    let renamed = format!("{}/a/c", tree);
    let result = server.run(&["rename", &nested, "--new-path", &renamed]);
    assert_eq!(result["payload"]["to"], renamed.as_str());

    server.run(&["rmdir", &tree, "--recursive"]);
    assert_eq!(server.run(&["exists", &tree])["payload"], false);
}
