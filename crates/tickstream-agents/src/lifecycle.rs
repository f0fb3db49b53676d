use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AgentError;

/// Where an agent run stands.
///
/// `Initializing -> Running -> {Completed | Stopped | Failed}`, plus
/// `Initializing -> Failed` when startup does not get that far. Completed,
/// Stopped and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Initializing,
    Running,
    /// Bound reached. Producer only.
    Completed,
    /// External stop signal observed.
    Stopped,
    /// Unrecoverable configuration or connection error.
    Failed,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// Tracks one agent's state and rejects illegal transitions.
#[derive(Debug)]
pub struct Lifecycle {
    agent: &'static str,
    bounded: bool,
    state: AgentState,
}

impl Lifecycle {
    /// Lifecycle of a bounded run, which may complete.
    pub fn producer() -> Self {
        Self::new("producer", true)
    }

    /// Lifecycle of an unbounded run, which can only stop or fail.
    pub fn consumer() -> Self {
        Self::new("consumer", false)
    }

    fn new(agent: &'static str, bounded: bool) -> Self {
        debug!(agent, "Agent initializing");
        Self {
            agent,
            bounded,
            state: AgentState::Initializing,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn transition(&mut self, next: AgentState) -> Result<(), AgentError> {
        use AgentState::*;

        let allowed = match (self.state, next) {
            (Initializing, Running) | (Initializing, Failed) => true,
            (Running, Completed) => self.bounded,
            (Running, Stopped) | (Running, Failed) => true,
            _ => false,
        };
        if !allowed {
            return Err(AgentError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        info!(agent = self.agent, from = ?self.state, to = ?next, "Agent state changed");
        self.state = next;
        Ok(())
    }

    /// Record a failure from whatever non-terminal state the run is in.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            info!(agent = self.agent, from = ?self.state, "Agent failed");
            self.state = AgentState::Failed;
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub state: AgentState,
    /// Producer: records published. Consumer: records forwarded and acknowledged.
    pub processed: u64,
    /// Consumer forward failures left for redelivery. Always 0 for producers.
    pub failed: u64,
    /// Producer run identity stamped on every record.
    pub run_id: Option<Uuid>,
}
