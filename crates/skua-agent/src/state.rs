//! Process-wide worker state: identity, capability set, and the outbound
//! event channel. Built once at startup and passed explicitly to the
//! connection manager, dispatcher, and execution engine.

use tokio::sync::mpsc;

use skua_core::config::AgentConfig;
use skua_core::protocol::AgentFrame;

/// Sender half of the outbound event channel. All frames for the
/// coordinator go through here; the connection manager's single writer
/// task drains the other end, which preserves per-test program order.
pub type EventSender = mpsc::UnboundedSender<AgentFrame>;

pub struct WorkerState {
    /// Process-lifetime unique identity, generated once at startup.
    pub agent_id: String,
    /// Browser engines advertised at registration, in declaration order.
    pub browsers: Vec<String>,
    events: EventSender,
}

impl WorkerState {
    pub fn new(config: &AgentConfig, events: EventSender) -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            browsers: config.browsers.clone(),
            events,
        }
    }

    /// The registration frame sent once per successful connection.
    pub fn register_frame(&self) -> AgentFrame {
        AgentFrame::AgentRegister {
            agent_id: self.agent_id.clone(),
            browsers: self.browsers.clone(),
        }
    }

    /// Queue a frame for the coordinator. A closed channel means the
    /// process is shutting down; the frame is dropped silently.
    pub fn emit(&self, frame: AgentFrame) {
        let _ = self.events.send(frame);
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable_and_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = WorkerState::new(&AgentConfig::default(), tx.clone());
        let b = WorkerState::new(&AgentConfig::default(), tx);
        assert_ne!(a.agent_id, b.agent_id);

        match (a.register_frame(), a.register_frame()) {
            (
                AgentFrame::AgentRegister { agent_id: id1, browsers },
                AgentFrame::AgentRegister { agent_id: id2, .. },
            ) => {
                assert_eq!(id1, id2);
                assert_eq!(browsers, vec!["chromium", "firefox", "webkit"]);
            }
            _ => unreachable!(),
        }
    }
}
