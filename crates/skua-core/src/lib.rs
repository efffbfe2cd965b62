//! Shared building blocks for the Skua worker agent: the coordinator wire
//! protocol, agent configuration, and the common error type.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{AgentError, Result};
