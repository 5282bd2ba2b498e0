//! Lifecycle task: the single owner of the OS child handle.
//!
//! Signals reach the child only through this task, so a PID is never
//! signalled after `wait()` has reaped it.

use crate::report::{ExitOutcome, ExitReport};
use launchkit_common::{OutputStream, TerminateError, TerminateResult};
use launchkit_log_collection::DrainSummary;
use launchkit_process::terminate_gracefully;
use launchkit_process_state::{LifecycleSnapshot, ProcessStateMachine, StateResult};
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlKind {
    /// SIGTERM
    Stop,
    /// SIGKILL
    Kill,
}

#[derive(Debug)]
pub(crate) struct ControlRequest {
    pub kind: ControlKind,
    pub respond_to: oneshot::Sender<TerminateResult<()>>,
}

pub(crate) struct LifecycleTask {
    pub child: Child,
    pub label: String,
    pub started_at: Instant,
    pub machine: ProcessStateMachine,
    pub stdout_task: JoinHandle<DrainSummary>,
    pub stderr_task: JoinHandle<DrainSummary>,
    pub control_rx: mpsc::UnboundedReceiver<ControlRequest>,
    pub state_tx: watch::Sender<LifecycleSnapshot>,
    pub report_tx: watch::Sender<Option<ExitReport>>,
}

impl LifecycleTask {
    pub async fn run(self) {
        let LifecycleTask {
            mut child,
            label,
            started_at,
            mut machine,
            stdout_task,
            stderr_task,
            mut control_rx,
            state_tx,
            report_tx,
        } = self;

        log_transition(&label, machine.transition_to_running());
        state_tx.send_replace(machine.snapshot());

        let mut stdout_task = Some(stdout_task);
        let mut stderr_task = Some(stderr_task);
        let mut stdout_summary: Option<DrainSummary> = None;
        let mut stderr_summary: Option<DrainSummary> = None;
        let mut exit: Option<(ExitOutcome, Duration)> = None;
        let mut control_open = true;

        loop {
            if exit.is_some() && stdout_summary.is_some() && stderr_summary.is_some() {
                break;
            }

            tokio::select! {
                status = child.wait(), if exit.is_none() => {
                    let elapsed = started_at.elapsed();
                    let outcome = match status {
                        Ok(status) => {
                            let outcome = ExitOutcome::from_status(&status);
                            info!(
                                process = %label,
                                exit_code = outcome.exit_code,
                                signaled = outcome.signaled,
                                "Process exited after {:?}",
                                elapsed
                            );
                            outcome
                        }
                        Err(e) => {
                            error!("Failed to wait for process {}: {}", label, e);
                            ExitOutcome::unknown()
                        }
                    };

                    log_transition(
                        &label,
                        machine.transition_to_exited(format!("exit code {}", outcome.exit_code)),
                    );
                    state_tx.send_replace(machine.snapshot());
                    exit = Some((outcome, elapsed));

                    if stdout_summary.is_none() || stderr_summary.is_none() {
                        debug!(process = %label, "Exited with output still open, waiting for end-of-stream");
                    }
                }

                request = control_rx.recv(), if control_open => {
                    match request {
                        Some(request) => {
                            let result = if exit.is_some() {
                                Err(TerminateError::AlreadyReaped)
                            } else {
                                signal_child(&mut child, request.kind)
                            };
                            // Requester may have given up waiting
                            let _ = request.respond_to.send(result);
                        }
                        None => control_open = false,
                    }
                }

                joined = join_drain(&mut stdout_task), if stdout_task.is_some() => {
                    stdout_task = None;
                    let summary = drain_result(&label, OutputStream::Stdout, joined);
                    log_transition(&label, machine.mark_stream_done(OutputStream::Stdout));
                    state_tx.send_replace(machine.snapshot());
                    stdout_summary = Some(summary);
                }

                joined = join_drain(&mut stderr_task), if stderr_task.is_some() => {
                    stderr_task = None;
                    let summary = drain_result(&label, OutputStream::Stderr, joined);
                    log_transition(&label, machine.mark_stream_done(OutputStream::Stderr));
                    state_tx.send_replace(machine.snapshot());
                    stderr_summary = Some(summary);
                }
            }
        }

        let (outcome, duration) = exit.unwrap_or_else(|| (ExitOutcome::unknown(), started_at.elapsed()));
        let report = ExitReport::new(
            outcome,
            duration,
            stdout_summary.unwrap_or_else(DrainSummary::lost),
            stderr_summary.unwrap_or_else(DrainSummary::lost),
        );

        log_transition(&label, machine.transition_to_reaped());
        state_tx.send_replace(machine.snapshot());

        if report.partial_delivery {
            warn!(process = %label, "Output delivery was incomplete");
        }
        debug!(
            process = %label,
            stdout_bytes = report.stdout.bytes,
            stderr_bytes = report.stderr.bytes,
            "Process reaped"
        );

        report_tx.send_replace(Some(report));
    }
}

fn signal_child(child: &mut Child, kind: ControlKind) -> TerminateResult<()> {
    let Some(pid) = child.id() else {
        return Err(TerminateError::AlreadyReaped);
    };

    match kind {
        ControlKind::Stop => terminate_gracefully(pid),
        ControlKind::Kill => {
            warn!("Force killing process (PID: {})", pid);
            child
                .start_kill()
                .map_err(|e| TerminateError::signal_failed(pid, e.to_string()))
        }
    }
}

async fn join_drain(
    task: &mut Option<JoinHandle<DrainSummary>>,
) -> Result<DrainSummary, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn drain_result(
    label: &str,
    stream: OutputStream,
    joined: Result<DrainSummary, JoinError>,
) -> DrainSummary {
    joined.unwrap_or_else(|e| {
        error!(process = %label, %stream, error = %e, "Drain task failed");
        DrainSummary::lost()
    })
}

fn log_transition(label: &str, result: StateResult<()>) {
    if let Err(e) = result {
        warn!(process = %label, error = %e, "Unexpected lifecycle transition");
    }
}
