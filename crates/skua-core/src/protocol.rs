//! Agent <-> coordinator wire protocol.
//!
//! All traffic is JSON event frames of the shape
//! `{"event": "<name>", "payload": {...}}`, carried over WebSocket (or the
//! HTTP polling fallback). The agent emits `agent_register`, `agent_log` and
//! `agent_result`; the coordinator emits `agent_registered` and
//! `execute_on_agent`.

use serde::{Deserialize, Serialize};

/// A wire frame — the top-level message envelope in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum AgentFrame {
    /// Agent -> Coordinator: announce identity and capabilities.
    AgentRegister {
        agent_id: String,
        browsers: Vec<String>,
    },

    /// Agent -> Coordinator: a progress line for a running test.
    AgentLog { test_id: String, message: String },

    /// Agent -> Coordinator: the final outcome of a test.
    AgentResult(TestResult),

    /// Coordinator -> Agent: registration acknowledgment. Informational
    /// only; the payload shape is whatever the coordinator sends.
    AgentRegistered(serde_json::Value),

    /// Coordinator -> Agent: run a unit of test code.
    ExecuteOnAgent(TestCommand),
}

/// A unit of work dispatched by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCommand {
    pub test_id: String,
    /// Source text that must define `run_test(browser_name, headless)`.
    pub code: String,
    /// Browser engine selector. Expected to be one of the advertised
    /// capability set, but not validated locally.
    pub browser: String,
    pub mode: ExecutionMode,
}

/// Execution mode selector. Only `headless` is meaningful; every other
/// value runs the browser headed. The original mode string is preserved so
/// operator-facing log lines can echo it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionMode {
    Headless,
    Other(String),
}

impl ExecutionMode {
    pub fn is_headless(&self) -> bool {
        matches!(self, Self::Headless)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Headless => "headless",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ExecutionMode {
    fn from(s: String) -> Self {
        if s == "headless" {
            Self::Headless
        } else {
            Self::Other(s)
        }
    }
}

impl From<ExecutionMode> for String {
    fn from(mode: ExecutionMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The normalized outcome reported back for a test command.
///
/// `screenshot` carries base64-encoded image bytes and is serialized as
/// `null` when absent — the coordinator expects the field to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub success: bool,
    pub logs: Vec<String>,
    pub screenshot: Option<String>,
}

impl TestResult {
    /// A failing result with a single explanatory log line and no
    /// screenshot — the shape every execution error collapses into.
    pub fn failure(test_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            success: false,
            logs: vec![message.into()],
            screenshot: None,
        }
    }
}
