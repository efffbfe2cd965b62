//! Inbound frame dispatch.
//!
//! The connection manager's read loop hands every decoded frame to
//! [`Dispatcher::handle_frame`]; the wiring from event name to handler is
//! the explicit match below. Execution happens on a freshly spawned task;
//! an atomic busy flag enforces the one-test-at-a-time rule by rejecting
//! overlapping commands with a failing result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use skua_core::protocol::{AgentFrame, TestCommand, TestResult};
use skua_runner::Runner;

use crate::engine::ExecutionEngine;
use crate::state::WorkerState;

/// Log line sent back when a command arrives while a test is executing.
pub const AGENT_BUSY: &str = "Error: agent is busy executing another test";

pub struct Dispatcher {
    state: Arc<WorkerState>,
    engine: Arc<ExecutionEngine>,
    busy: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(state: Arc<WorkerState>, runner: Arc<dyn Runner>) -> Self {
        let engine = Arc::new(ExecutionEngine::new(runner, state.events()));
        Self {
            state,
            engine,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle_frame(&self, frame: AgentFrame) {
        match frame {
            AgentFrame::AgentRegistered(ack) => {
                info!("Agent registered successfully: {ack}");
            }
            AgentFrame::ExecuteOnAgent(cmd) => self.handle_execute(cmd),
            // Agent-originated events echoed back have no meaning here.
            other => debug!("Ignoring unexpected inbound frame: {other:?}"),
        }
    }

    fn handle_execute(&self, cmd: TestCommand) {
        info!(
            test_id = %cmd.test_id,
            browser = %cmd.browser,
            mode = %cmd.mode,
            "Executing test"
        );

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(test_id = %cmd.test_id, "Test rejected: agent busy");
            self.state
                .emit(AgentFrame::AgentResult(TestResult::failure(
                    cmd.test_id,
                    AGENT_BUSY,
                )));
            return;
        }

        let engine = self.engine.clone();
        let busy = self.busy.clone();
        tokio::spawn(async move {
            engine.execute(cmd).await;
            busy.store(false, Ordering::SeqCst);
        });
    }
}
