//! Shared testing utilities for capdeploy CLI tests.

use assert_cmd::Command;
use mockito::{Matcher, Mock, ServerGuard};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PASSWORD: &str = "captain42";

/// Isolated working directory for CLI invocations.
#[allow(dead_code)]
pub struct TestContext {
    root: TempDir,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp directory for tests");
        Self { root }
    }

    pub fn work_dir(&self) -> &Path {
        self.root.path()
    }

    /// Write `content` to `name` inside the work directory.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// `capdeploy` in the work directory with no controller configured.
    pub fn cli(&self) -> Command {
        let mut cmd = Command::cargo_bin("capdeploy").expect("Failed to locate capdeploy binary");
        cmd.current_dir(self.work_dir())
            .env_remove("CAPROVER_URL")
            .env_remove("CAPROVER_PASSWORD")
            .env("RUST_LOG", "off");
        cmd
    }

    /// `capdeploy` pointed at a mock controller.
    pub fn cli_for(&self, server: &ServerGuard) -> Command {
        let mut cmd = self.cli();
        cmd.env("CAPROVER_URL", server.url()).env("CAPROVER_PASSWORD", PASSWORD);
        cmd
    }
}

/// Successful controller envelope around `data`.
pub fn envelope(data: serde_json::Value) -> String {
    serde_json::json!({ "status": 100, "description": "OK", "data": data }).to_string()
}

pub fn mock_login(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/api/v2/login")
        .match_body(Matcher::PartialJson(serde_json::json!({ "password": PASSWORD })))
        .with_body(envelope(serde_json::json!({ "token": "tok-1" })))
        .create()
}

/// App listing containing bare apps with the given names.
pub fn mock_apps(server: &mut ServerGuard, names: &[&str]) -> Mock {
    let apps: Vec<serde_json::Value> = names
        .iter()
        .map(|name| {
            serde_json::json!({
                "appName": name,
                "hasPersistentData": false,
                "instanceCount": 1,
                "notExposeAsWebApp": false,
                "volumes": [],
                "envVars": [],
                "ports": []
            })
        })
        .collect();
    server
        .mock("GET", "/api/v2/user/apps/appDefinitions")
        .with_body(envelope(serde_json::json!({ "appDefinitions": apps })))
        .create()
}
