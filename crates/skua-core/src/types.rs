//! Internal types shared between the runner and the execution engine.

/// The normalized record produced by a runner from `run_test`'s return
/// value. Every field has the defaulting behavior the contract requires:
/// `success` defaults to false, `logs` to empty, `screenshot` to absent.
/// The screenshot here is raw image bytes; base64 re-encoding for the wire
/// happens at reporting time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub logs: Vec<String>,
    pub screenshot: Option<Vec<u8>>,
}
