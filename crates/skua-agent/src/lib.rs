//! The Skua worker agent.
//!
//! One long-lived process that connects to a coordinator, advertises the
//! browsers it can drive, executes dispatched test code out-of-process,
//! and reports results. One test runs at a time.

pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod state;
pub mod transport;

pub use connection::{ConnectionManager, Disconnect};
pub use dispatch::Dispatcher;
pub use engine::ExecutionEngine;
pub use state::{EventSender, WorkerState};
