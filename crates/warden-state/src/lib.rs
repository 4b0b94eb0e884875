use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use warden_common::{SupervisorError, SupervisorResult};

/// Lifecycle state of a supervised instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Instance is registered but has never been launched
    Stopped,
    /// Instance launched, still inside its startup probation window
    Starting,
    /// Instance survived the probation window and is running normally
    Running,
    /// Stop signal sent, waiting for the child to exit
    Stopping,
    /// Instance exited (explicit stop, or unexpected exit without restart)
    Exited,
    /// Startup retry budget exhausted; no further launches will happen
    Fatal,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Exited => write!(f, "exited"),
            ProcessState::Fatal => write!(f, "fatal"),
        }
    }
}

impl ProcessState {
    /// Check if the instance is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Stopped | ProcessState::Exited | ProcessState::Fatal
        )
    }

    /// Check if the instance is in a transitional state
    pub fn is_transitional(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Stopping)
    }

    /// Check if the instance is active (running or transitional)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// State machine governing the lifecycle transitions of one instance.
///
/// Exited is re-enterable toward Starting only for restart-on-unexpected-exit;
/// an explicit stop parks the machine in Exited and the owning watcher never
/// asks for another launch. Fatal has no outgoing transitions.
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    instance_id: String,
    current_state: ProcessState,
    previous_state: Option<ProcessState>,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

const MAX_HISTORY: usize = 100;

impl ProcessStateMachine {
    /// Create a new state machine for an instance
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            current_state: ProcessState::Stopped,
            previous_state: None,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    /// Get the current state
    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    /// Get the previous state
    pub fn previous_state(&self) -> Option<ProcessState> {
        self.previous_state
    }

    /// Get the state history
    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// Get the time of the last state transition
    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from current state to target state is valid
    pub fn is_valid_transition(&self, target_state: ProcessState) -> bool {
        match (self.current_state, target_state) {
            // From Stopped
            (ProcessState::Stopped, ProcessState::Starting) => true,

            // From Starting
            (ProcessState::Starting, ProcessState::Running) => true,
            (ProcessState::Starting, ProcessState::Stopping) => true, // Cancel startup
            (ProcessState::Starting, ProcessState::Fatal) => true,

            // From Running
            (ProcessState::Running, ProcessState::Stopping) => true,
            (ProcessState::Running, ProcessState::Exited) => true,

            // From Stopping
            (ProcessState::Stopping, ProcessState::Exited) => true,

            // From Exited (restart after unexpected exit only)
            (ProcessState::Exited, ProcessState::Starting) => true,

            // Same state (no-op; covers startup retry relaunches)
            (state, target) if state == target => true,

            // All other transitions are invalid. Fatal in particular has
            // no outgoing transitions.
            _ => false,
        }
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(
        &mut self,
        target_state: ProcessState,
        reason: Option<String>,
    ) -> SupervisorResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(SupervisorError::invalid_state(
                &self.instance_id,
                format!("transition to {}", target_state),
                self.current_state.to_string(),
            ));
        }

        let now = Utc::now();
        let transition = StateTransition {
            from_state: self.current_state,
            to_state: target_state,
            timestamp: now,
            reason,
        };

        self.previous_state = Some(self.current_state);
        self.current_state = target_state;
        self.last_transition_time = now;
        self.state_history.push(transition);

        // Limit history size to prevent unbounded growth
        if self.state_history.len() > MAX_HISTORY {
            self.state_history.remove(0);
        }

        tracing::debug!(
            instance = %self.instance_id,
            from = %self.previous_state.unwrap_or(self.current_state),
            to = %self.current_state,
            "state transition"
        );

        Ok(())
    }

    /// Convenience methods for specific transitions
    pub fn transition_to_starting(&mut self, reason: impl Into<String>) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Starting, Some(reason.into()))
    }

    pub fn transition_to_running(&mut self) -> SupervisorResult<()> {
        self.transition_to(
            ProcessState::Running,
            Some("survived startup probation".to_string()),
        )
    }

    pub fn transition_to_stopping(&mut self) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Stopping, Some("stop requested".to_string()))
    }

    pub fn transition_to_exited(&mut self, reason: impl Into<String>) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Exited, Some(reason.into()))
    }

    pub fn transition_to_fatal(&mut self, reason: impl Into<String>) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Fatal, Some(reason.into()))
    }

    /// Check if the instance can be launched (or relaunched)
    pub fn can_start(&self) -> bool {
        matches!(
            self.current_state,
            ProcessState::Stopped | ProcessState::Exited
        )
    }

    /// Check if the instance can be stopped
    pub fn can_stop(&self) -> bool {
        matches!(
            self.current_state,
            ProcessState::Running | ProcessState::Starting
        )
    }

    /// Get the time spent in the current state
    pub fn time_in_current_state(&self) -> chrono::Duration {
        Utc::now() - self.last_transition_time
    }

    /// Get the most recent transition
    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.last()
    }

    /// Count transitions to a specific state
    pub fn count_transitions_to(&self, state: ProcessState) -> usize {
        self.state_history
            .iter()
            .filter(|t| t.to_state == state)
            .count()
    }
}
