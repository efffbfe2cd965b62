//! Subprocess runner — materializes supplied source plus a fixed harness
//! into a temp script and executes it with a configured interpreter.
//!
//! The harness invokes `run_test(browser_name=..., headless=...)` and
//! prints a single JSON report line on stdout:
//! `{"success": bool, "logs": [str], "screenshot": base64|null}`.
//! Browser name and headless flag travel as argv so the harness text never
//! needs templating.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use skua_core::config::RunnerConfig;
use skua_core::types::RunOutcome;

use crate::Runner;

/// Harness appended after the supplied source. Runs in the same module
/// scope, so a top-level `run_test` definition is visible in `globals()`.
const HARNESS: &str = r#"

# --- execution harness (appended by the agent) ---
import asyncio as _skua_asyncio
import base64 as _skua_base64
import json as _skua_json
import sys as _skua_sys


def _skua_report(payload):
    _skua_sys.stdout.write("\n" + _skua_json.dumps(payload) + "\n")
    _skua_sys.stdout.flush()


async def _skua_main():
    if "run_test" not in globals():
        _skua_report({
            "success": False,
            "logs": ["Error: Generated code must contain a run_test function"],
            "screenshot": None,
        })
        return
    result = await run_test(
        browser_name=_skua_sys.argv[1],
        headless=_skua_sys.argv[2] == "true",
    ) or {}
    shot = result.get("screenshot")
    _skua_report({
        "success": bool(result.get("success", False)),
        "logs": [str(line) for line in result.get("logs", [])],
        "screenshot": _skua_base64.b64encode(shot).decode("ascii") if shot else None,
    })


_skua_asyncio.run(_skua_main())
"#;

/// Report line printed by the harness.
#[derive(Debug, Deserialize)]
struct RunReport {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    screenshot: Option<String>,
}

pub struct SubprocessRunner {
    config: RunnerConfig,
}

impl SubprocessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn script_path() -> PathBuf {
        std::env::temp_dir().join(format!("skua-test-{}.py", uuid::Uuid::new_v4()))
    }
}

/// Extract the harness report from child stdout. The report is the last
/// non-empty line; anything before it is output from the supplied code.
fn parse_report(stdout: &str) -> anyhow::Result<RunOutcome> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow::anyhow!("runner produced no result report"))?;

    let report: RunReport = serde_json::from_str(line)
        .map_err(|e| anyhow::anyhow!("malformed runner report: {e}"))?;

    let screenshot = match report.screenshot {
        Some(b64) if !b64.is_empty() => Some(
            base64::engine::general_purpose::STANDARD
                .decode(&b64)
                .map_err(|e| anyhow::anyhow!("invalid screenshot encoding: {e}"))?,
        ),
        _ => None,
    };

    Ok(RunOutcome {
        success: report.success,
        logs: report.logs,
        screenshot,
    })
}

/// The most useful single line from a failed child's stderr — for Python
/// tracebacks that is the final `SomeError: message` line.
fn stderr_summary(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("test process failed with no output")
        .to_string()
}

#[async_trait]
impl Runner for SubprocessRunner {
    fn defines_entry_point(&self, code: &str) -> bool {
        code.lines().any(|line| {
            let trimmed = line.trim_start();
            let def = trimmed
                .strip_prefix("async def run_test")
                .or_else(|| trimmed.strip_prefix("def run_test"));
            // Must be exactly `run_test`, not e.g. `run_tests`.
            if matches!(def.and_then(|r| r.chars().next()), Some('(') | Some(' ')) {
                return true;
            }
            // Module-level binding: `run_test = _impl`, possibly annotated.
            // The harness re-checks `globals()` at runtime, so this only
            // needs to be permissive enough not to reject valid code.
            if let Some(rest) = line.strip_prefix("run_test") {
                let rest = rest.trim_start();
                return (rest.starts_with('=') && !rest.starts_with("==")) || rest.starts_with(':');
            }
            false
        })
    }

    async fn run(&self, code: &str, browser: &str, headless: bool) -> anyhow::Result<RunOutcome> {
        let path = Self::script_path();
        let script = format!("{code}\n{HARNESS}");
        tokio::fs::write(&path, script).await?;

        debug!(script = %path.display(), browser, headless, "Spawning test process");

        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&path)
            .arg(browser)
            .arg(if headless { "true" } else { "false" })
            .stdin(Stdio::null())
            .output()
            .await;

        // Best-effort cleanup before looking at the result.
        let _ = tokio::fs::remove_file(&path).await;

        let output = output
            .map_err(|e| anyhow::anyhow!("failed to spawn {}: {e}", self.config.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{}", stderr_summary(&stderr));
        }

        parse_report(&String::from_utf8_lossy(&output.stdout))
    }
}
