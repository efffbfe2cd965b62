//! Execution of coordinator-supplied test code.
//!
//! The agent never evaluates supplied source in-process. The [`Runner`]
//! trait is the seam between the execution engine and whatever actually
//! runs the code; the production implementation ([`SubprocessRunner`])
//! hands the source to an interpreter in a child process so a crash in
//! supplied code cannot take down the worker.

use async_trait::async_trait;

use skua_core::types::RunOutcome;

pub mod subprocess;

pub use subprocess::SubprocessRunner;

/// Executes one unit of supplied test code against a browser.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Cheap static check that the supplied source defines the `run_test`
    /// entry point. When this returns false the engine reports the
    /// contract violation without launching anything.
    fn defines_entry_point(&self, code: &str) -> bool;

    /// Run `run_test(browser_name, headless)` from the supplied source and
    /// normalize its return value. May take arbitrary wall-clock time; the
    /// engine awaits with no timeout of its own.
    async fn run(&self, code: &str, browser: &str, headless: bool) -> anyhow::Result<RunOutcome>;
}
