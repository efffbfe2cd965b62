//! Execution engine — runs one test command through the runner and emits
//! its log events and final result.
//!
//! Every command flows Preparing -> Launching -> Running -> Reporting.
//! Any error on that path is caught here and converted into a failing
//! result with a single explanatory log line; nothing propagates out of
//! the engine or disturbs the connection.

use std::sync::Arc;

use base64::Engine as _;
use tracing::info;

use skua_core::protocol::{AgentFrame, TestCommand, TestResult};
use skua_runner::Runner;

use crate::state::EventSender;

/// Log line sent back when the supplied code lacks the entry point.
pub const MISSING_ENTRY_POINT: &str = "Error: Generated code must contain a run_test function";

pub struct ExecutionEngine {
    runner: Arc<dyn Runner>,
    events: EventSender,
}

impl ExecutionEngine {
    pub fn new(runner: Arc<dyn Runner>, events: EventSender) -> Self {
        Self { runner, events }
    }

    /// Run one command to completion. Always emits exactly one
    /// `agent_result` frame.
    pub async fn execute(&self, cmd: TestCommand) {
        let result = match self.try_execute(&cmd).await {
            Ok(result) => result,
            Err(e) => TestResult::failure(&cmd.test_id, format!("Agent execution error: {e}")),
        };

        info!(
            test_id = %cmd.test_id,
            "Test completed: {}",
            if result.success { "SUCCESS" } else { "FAILED" }
        );
        self.emit(AgentFrame::AgentResult(result));
    }

    async fn try_execute(&self, cmd: &TestCommand) -> anyhow::Result<TestResult> {
        self.log(
            &cmd.test_id,
            format!("Preparing to execute test in {} mode...", cmd.mode),
        );

        if !self.runner.defines_entry_point(&cmd.code) {
            return Ok(TestResult::failure(&cmd.test_id, MISSING_ENTRY_POINT));
        }

        self.log(&cmd.test_id, format!("Launching {} browser...", cmd.browser));

        let headless = cmd.mode.is_headless();
        let outcome = self.runner.run(&cmd.code, &cmd.browser, headless).await?;

        Ok(TestResult {
            test_id: cmd.test_id.clone(),
            success: outcome.success,
            logs: outcome.logs,
            screenshot: outcome
                .screenshot
                .filter(|bytes| !bytes.is_empty())
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
        })
    }

    fn log(&self, test_id: &str, message: String) {
        self.emit(AgentFrame::AgentLog {
            test_id: test_id.to_string(),
            message,
        });
    }

    fn emit(&self, frame: AgentFrame) {
        let _ = self.events.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use skua_core::protocol::ExecutionMode;
    use skua_core::types::RunOutcome;

    /// Runner double: records the arguments it was called with and
    /// returns a canned outcome (or error).
    struct StubRunner {
        outcome: Mutex<Option<anyhow::Result<RunOutcome>>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl StubRunner {
        fn returning(outcome: anyhow::Result<RunOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Runner for StubRunner {
        fn defines_entry_point(&self, code: &str) -> bool {
            code.contains("def run_test")
        }

        async fn run(
            &self,
            _code: &str,
            browser: &str,
            headless: bool,
        ) -> anyhow::Result<RunOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((browser.to_string(), headless));
            self.outcome.lock().unwrap().take().expect("single call")
        }
    }

    fn command(code: &str, mode: &str) -> TestCommand {
        TestCommand {
            test_id: "t1".into(),
            code: code.into(),
            browser: "chromium".into(),
            mode: ExecutionMode::from(mode.to_string()),
        }
    }

    const VALID_CODE: &str =
        "async def run_test(browser_name, headless):\n    return {'success': True, 'logs': ['ok'], 'screenshot': None}";

    async fn run_engine(
        runner: Arc<StubRunner>,
        cmd: TestCommand,
    ) -> Vec<AgentFrame> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = ExecutionEngine::new(runner, tx);
        engine.execute(cmd).await;

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn final_result(frames: &[AgentFrame]) -> &TestResult {
        match frames.last() {
            Some(AgentFrame::AgentResult(result)) => result,
            other => panic!("expected trailing result frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_order_and_success() {
        let runner = StubRunner::returning(Ok(RunOutcome {
            success: true,
            logs: vec!["ok".into()],
            screenshot: None,
        }));
        let frames = run_engine(runner, command(VALID_CODE, "headless")).await;

        assert_eq!(frames.len(), 3);
        match &frames[0] {
            AgentFrame::AgentLog { test_id, message } => {
                assert_eq!(test_id, "t1");
                assert_eq!(message, "Preparing to execute test in headless mode...");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        match &frames[1] {
            AgentFrame::AgentLog { message, .. } => {
                assert_eq!(message, "Launching chromium browser...");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        let result = final_result(&frames);
        assert!(result.success);
        assert_eq!(result.logs, vec!["ok"]);
        assert!(result.screenshot.is_none());
    }

    #[tokio::test]
    async fn test_missing_entry_point_skips_launch() {
        let runner = StubRunner::returning(Ok(RunOutcome::default()));
        let frames = run_engine(runner.clone(), command("print('no entry')", "headless")).await;

        // Preparing log, then the failing result. No Launching log, no run.
        assert_eq!(frames.len(), 2);
        let result = final_result(&frames);
        assert!(!result.success);
        assert_eq!(result.logs, vec![MISSING_ENTRY_POINT]);
        assert!(result.screenshot.is_none());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_headless_flag_resolution() {
        for (mode, expected) in [("headless", true), ("headed", false), ("anything", false)] {
            let runner = StubRunner::returning(Ok(RunOutcome::default()));
            run_engine(runner.clone(), command(VALID_CODE, mode)).await;
            let calls = runner.calls.lock().unwrap();
            assert_eq!(calls.as_slice(), &[("chromium".to_string(), expected)]);
        }
    }

    #[tokio::test]
    async fn test_screenshot_is_base64_encoded() {
        let runner = StubRunner::returning(Ok(RunOutcome {
            success: true,
            logs: vec![],
            screenshot: Some(b"PNGBYTES".to_vec()),
        }));
        let frames = run_engine(runner, command(VALID_CODE, "headless")).await;
        let result = final_result(&frames);
        let encoded = result.screenshot.as_deref().expect("screenshot present");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, b"PNGBYTES");
    }

    #[tokio::test]
    async fn test_empty_screenshot_reported_absent() {
        let runner = StubRunner::returning(Ok(RunOutcome {
            success: true,
            logs: vec![],
            screenshot: Some(Vec::new()),
        }));
        let frames = run_engine(runner, command(VALID_CODE, "headless")).await;
        assert!(final_result(&frames).screenshot.is_none());
    }

    #[tokio::test]
    async fn test_runner_error_becomes_failing_result() {
        let runner = StubRunner::returning(Err(anyhow::anyhow!("ValueError: page not found")));
        let frames = run_engine(runner, command(VALID_CODE, "headless")).await;
        let result = final_result(&frames);
        assert!(!result.success);
        assert_eq!(result.logs.len(), 1);
        assert!(result.logs[0].contains("ValueError: page not found"));
        assert!(result.logs[0].starts_with("Agent execution error:"));
        assert!(result.screenshot.is_none());
    }
}
