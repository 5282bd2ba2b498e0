//! Lifecycle state machine for one supervised child process.
//!
//! ```text
//! Spawned -> Running -> Exited -> Reaped
//!               \          /
//!        stdout done, stderr done (independently, in either phase)
//! ```
//!
//! `Reaped` is terminal and is only reachable once the OS has reported exit
//! AND both output streams have reached end-of-stream.

use chrono::{DateTime, Utc};
use launchkit_common::OutputStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle phase of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// OS process created, lifecycle task not yet running
    Spawned,
    /// Lifecycle task is watching the process
    Running,
    /// OS reported exit; output may still be draining
    Exited,
    /// Exit collected and both streams drained
    Reaped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Spawned => write!(f, "spawned"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited => write!(f, "exited"),
            ProcessState::Reaped => write!(f, "reaped"),
        }
    }
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Reaped)
    }

    /// Whether the OS process may still be alive.
    pub fn is_alive(&self) -> bool {
        matches!(self, ProcessState::Spawned | ProcessState::Running)
    }
}

/// Errors for rejected transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid transition for {process}: {from} -> {to}")]
    InvalidTransition {
        process: String,
        from: ProcessState,
        to: ProcessState,
    },

    #[error("Cannot reap {process}: {pending} has not reached end-of-stream")]
    StreamsIncomplete {
        process: String,
        pending: OutputStream,
    },

    #[error("Stream {stream} of {process} cannot complete in state {state}")]
    InvalidStreamCompletion {
        process: String,
        stream: OutputStream,
        state: ProcessState,
    },
}

pub type StateResult<T> = std::result::Result<T, StateError>;

/// One entry of the lifecycle history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Entered(ProcessState),
    StreamDone(OutputStream),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub event: LifecycleEvent,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Point-in-time view published to observers of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: ProcessState,
    pub stdout_done: bool,
    pub stderr_done: bool,
}

impl LifecycleSnapshot {
    pub fn stream_done(&self, stream: OutputStream) -> bool {
        match stream {
            OutputStream::Stdout => self.stdout_done,
            OutputStream::Stderr => self.stderr_done,
        }
    }
}

/// State machine owned by the lifecycle task of a single child.
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    process: String,
    current_state: ProcessState,
    previous_state: Option<ProcessState>,
    stdout_done: bool,
    stderr_done: bool,
    history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl ProcessStateMachine {
    /// Create a state machine in `Spawned`. `process` labels log lines and
    /// errors (typically the executable name and PID).
    pub fn new(process: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            process: process.into(),
            current_state: ProcessState::Spawned,
            previous_state: None,
            stdout_done: false,
            stderr_done: false,
            history: vec![StateTransition {
                event: LifecycleEvent::Entered(ProcessState::Spawned),
                timestamp: now,
                reason: None,
            }],
            last_transition_time: now,
        }
    }

    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<ProcessState> {
        self.previous_state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    pub fn time_in_current_state(&self) -> chrono::Duration {
        Utc::now() - self.last_transition_time
    }

    pub fn is_stream_done(&self, stream: OutputStream) -> bool {
        match stream {
            OutputStream::Stdout => self.stdout_done,
            OutputStream::Stderr => self.stderr_done,
        }
    }

    pub fn streams_complete(&self) -> bool {
        self.stdout_done && self.stderr_done
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.current_state,
            stdout_done: self.stdout_done,
            stderr_done: self.stderr_done,
        }
    }

    /// Check if a transition from the current state to `target` is valid,
    /// ignoring stream completion.
    pub fn is_valid_transition(&self, target: ProcessState) -> bool {
        match (self.current_state, target) {
            (ProcessState::Spawned, ProcessState::Running) => true,
            (ProcessState::Running, ProcessState::Exited) => true,
            (ProcessState::Exited, ProcessState::Reaped) => true,

            // Same state (no-op), except leaving the terminal state
            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Transition to `target`, recording `reason` in the history.
    pub fn transition_to(&mut self, target: ProcessState, reason: Option<String>) -> StateResult<()> {
        if !self.is_valid_transition(target) {
            return Err(StateError::InvalidTransition {
                process: self.process.clone(),
                from: self.current_state,
                to: target,
            });
        }

        if target == ProcessState::Reaped {
            if let Some(pending) = self.first_pending_stream() {
                return Err(StateError::StreamsIncomplete {
                    process: self.process.clone(),
                    pending,
                });
            }
        }

        if target == self.current_state {
            return Ok(());
        }

        let from = self.current_state;
        self.previous_state = Some(from);
        self.current_state = target;
        self.record(LifecycleEvent::Entered(target), reason);

        tracing::debug!("Process {} transitioned from {} to {}", self.process, from, target);

        Ok(())
    }

    pub fn transition_to_running(&mut self) -> StateResult<()> {
        self.transition_to(ProcessState::Running, Some("Lifecycle task started".to_string()))
    }

    pub fn transition_to_exited(&mut self, reason: String) -> StateResult<()> {
        self.transition_to(ProcessState::Exited, Some(reason))
    }

    pub fn transition_to_reaped(&mut self) -> StateResult<()> {
        self.transition_to(ProcessState::Reaped, Some("Exit collected and output drained".to_string()))
    }

    /// Record that `stream` reached end-of-stream (or its drain task ended).
    ///
    /// Valid while `Running` or `Exited`; marking an already-complete stream
    /// again is a no-op.
    pub fn mark_stream_done(&mut self, stream: OutputStream) -> StateResult<()> {
        if !matches!(self.current_state, ProcessState::Running | ProcessState::Exited) {
            return Err(StateError::InvalidStreamCompletion {
                process: self.process.clone(),
                stream,
                state: self.current_state,
            });
        }

        if self.is_stream_done(stream) {
            return Ok(());
        }

        match stream {
            OutputStream::Stdout => self.stdout_done = true,
            OutputStream::Stderr => self.stderr_done = true,
        }
        self.record(LifecycleEvent::StreamDone(stream), None);

        tracing::debug!("Process {} {} drained (state: {})", self.process, stream, self.current_state);

        Ok(())
    }

    /// Count how many history entries match `event`.
    pub fn count_events(&self, event: &LifecycleEvent) -> usize {
        self.history.iter().filter(|t| &t.event == event).count()
    }

    fn first_pending_stream(&self) -> Option<OutputStream> {
        OutputStream::ALL
            .into_iter()
            .find(|stream| !self.is_stream_done(*stream))
    }

    fn record(&mut self, event: LifecycleEvent, reason: Option<String>) {
        let now = Utc::now();
        self.history.push(StateTransition {
            event,
            timestamp: now,
            reason,
        });
        self.last_transition_time = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_creation() {
        let sm = ProcessStateMachine::new("helper");
        assert_eq!(sm.current_state(), ProcessState::Spawned);
        assert_eq!(sm.previous_state(), None);
        assert_eq!(sm.history().len(), 1);
        assert!(!sm.streams_complete());
    }

    #[test]
    fn test_happy_path() {
        let mut sm = ProcessStateMachine::new("helper");

        sm.transition_to_running().unwrap();
        sm.mark_stream_done(OutputStream::Stdout).unwrap();
        sm.mark_stream_done(OutputStream::Stderr).unwrap();
        sm.transition_to_exited("exit code 0".to_string()).unwrap();
        sm.transition_to_reaped().unwrap();

        assert_eq!(sm.current_state(), ProcessState::Reaped);
        assert_eq!(sm.previous_state(), Some(ProcessState::Exited));
        assert!(sm.current_state().is_terminal());
        assert_eq!(sm.history().len(), 6);
    }

    #[test]
    fn test_exit_before_end_of_stream() {
        let mut sm = ProcessStateMachine::new("helper");
        sm.transition_to_running().unwrap();
        sm.transition_to_exited("exit code 0".to_string()).unwrap();
        sm.mark_stream_done(OutputStream::Stderr).unwrap();

        let err = sm.transition_to_reaped().unwrap_err();
        assert_eq!(
            err,
            StateError::StreamsIncomplete {
                process: "helper".to_string(),
                pending: OutputStream::Stdout,
            }
        );
        assert_eq!(sm.current_state(), ProcessState::Exited);

        sm.mark_stream_done(OutputStream::Stdout).unwrap();
        sm.transition_to_reaped().unwrap();
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = ProcessStateMachine::new("helper");

        // Spawned -> Exited must go through Running
        assert!(!sm.is_valid_transition(ProcessState::Exited));
        assert!(sm.transition_to(ProcessState::Exited, None).is_err());

        // Running -> Reaped must go through Exited
        sm.transition_to_running().unwrap();
        assert!(matches!(
            sm.transition_to(ProcessState::Reaped, None).unwrap_err(),
            StateError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_reaped_is_terminal() {
        let mut sm = ProcessStateMachine::new("helper");
        sm.transition_to_running().unwrap();
        sm.mark_stream_done(OutputStream::Stdout).unwrap();
        sm.mark_stream_done(OutputStream::Stderr).unwrap();
        sm.transition_to_exited("signal 9".to_string()).unwrap();
        sm.transition_to_reaped().unwrap();

        assert!(sm.transition_to(ProcessState::Running, None).is_err());
        assert!(sm.mark_stream_done(OutputStream::Stdout).is_err());
        // Same-state is a no-op
        assert!(sm.transition_to(ProcessState::Reaped, None).is_ok());
    }

    #[test]
    fn test_stream_completion_requires_running() {
        let mut sm = ProcessStateMachine::new("helper");
        let err = sm.mark_stream_done(OutputStream::Stdout).unwrap_err();
        assert!(matches!(err, StateError::InvalidStreamCompletion { .. }));
    }

    #[test]
    fn test_stream_completion_is_idempotent() {
        let mut sm = ProcessStateMachine::new("helper");
        sm.transition_to_running().unwrap();
        sm.mark_stream_done(OutputStream::Stdout).unwrap();
        sm.mark_stream_done(OutputStream::Stdout).unwrap();

        assert_eq!(
            sm.count_events(&LifecycleEvent::StreamDone(OutputStream::Stdout)),
            1
        );
    }

    #[test]
    fn test_snapshot() {
        let mut sm = ProcessStateMachine::new("helper");
        sm.transition_to_running().unwrap();
        sm.mark_stream_done(OutputStream::Stderr).unwrap();

        let snapshot = sm.snapshot();
        assert_eq!(snapshot.state, ProcessState::Running);
        assert!(!snapshot.stream_done(OutputStream::Stdout));
        assert!(snapshot.stream_done(OutputStream::Stderr));
    }

    #[test]
    fn test_state_properties() {
        assert!(ProcessState::Spawned.is_alive());
        assert!(ProcessState::Running.is_alive());
        assert!(!ProcessState::Exited.is_alive());
        assert!(!ProcessState::Reaped.is_alive());
        assert_eq!(ProcessState::Reaped.to_string(), "reaped");
    }
}
