//! Handle to a launched child.

use crate::lifecycle::{ControlKind, ControlRequest};
use crate::report::ExitReport;
use chrono::{DateTime, Utc};
use launchkit_common::{OutputStream, TerminateError, TerminateResult};
use launchkit_log_collection::{DrainSummary, StreamProgress};
use launchkit_process_state::LifecycleSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A child that has been spawned and is (or was) being supervised.
///
/// All methods take `&self`; the handle can be shared behind an `Arc` so one
/// task waits while another terminates.
#[derive(Debug)]
pub struct RunningProcess {
    pub(crate) pid: u32,
    pub(crate) label: String,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) control_tx: mpsc::UnboundedSender<ControlRequest>,
    pub(crate) state_rx: watch::Receiver<LifecycleSnapshot>,
    pub(crate) report_rx: watch::Receiver<Option<ExitReport>>,
    pub(crate) stdout_progress: Arc<StreamProgress>,
    pub(crate) stderr_progress: Arc<StreamProgress>,
    pub(crate) force_kill_timeout: Duration,
}

impl RunningProcess {
    /// OS process id. Stays valid as an identifier after exit; do not signal
    /// it directly.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// `name[pid]`, as used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> LifecycleSnapshot {
        *self.state_rx.borrow()
    }

    pub fn stream_progress(&self, stream: OutputStream) -> &StreamProgress {
        match stream {
            OutputStream::Stdout => &self.stdout_progress,
            OutputStream::Stderr => &self.stderr_progress,
        }
    }

    /// The report if the process has already been reaped.
    pub fn try_report(&self) -> Option<ExitReport> {
        self.report_rx.borrow().clone()
    }

    /// Wait until the process has been reaped and both output streams have
    /// been drained into the sink.
    pub async fn wait(&self) -> ExitReport {
        let mut report_rx = self.report_rx.clone();

        let result = report_rx
            .wait_for(|report| report.is_some())
            .await
            .map(|report| (*report).clone());

        match result {
            Ok(Some(report)) => report,
            _ => {
                error!("Lifecycle task for {} ended without an exit report", self.label);
                ExitReport {
                    exit_code: -1,
                    signaled: false,
                    signal: None,
                    duration: Duration::ZERO,
                    partial_delivery: true,
                    stdout: DrainSummary::lost(),
                    stderr: DrainSummary::lost(),
                }
            }
        }
    }

    /// Ask the process to exit, escalating to a forced kill after
    /// `grace_period`.
    ///
    /// Returns once the OS has reported exit. Output may still be draining;
    /// use [`wait`](Self::wait) for the full report. Terminating a process
    /// that already exited succeeds without sending anything.
    pub async fn terminate(&self, grace_period: Duration) -> TerminateResult<()> {
        match self.terminate_inner(grace_period).await {
            Err(TerminateError::AlreadyReaped) => {
                debug!("Process {} already exited, nothing to terminate", self.label);
                Ok(())
            }
            result => result,
        }
    }

    async fn terminate_inner(&self, grace_period: Duration) -> TerminateResult<()> {
        if !self.state().state.is_alive() {
            return Err(TerminateError::AlreadyReaped);
        }

        info!("Terminating process: {}", self.label);
        self.send_control(ControlKind::Stop).await?;

        if self.wait_for_exit(grace_period).await {
            info!("Process terminated gracefully: {}", self.label);
            return Ok(());
        }

        warn!(
            "Process {} did not exit within {:?}, sending SIGKILL",
            self.label, grace_period
        );
        self.send_control(ControlKind::Kill).await?;

        if self.wait_for_exit(self.force_kill_timeout).await {
            info!("Process terminated after force kill: {}", self.label);
            return Ok(());
        }

        Err(TerminateError::timeout(
            self.pid,
            grace_period + self.force_kill_timeout,
        ))
    }

    async fn send_control(&self, kind: ControlKind) -> TerminateResult<()> {
        let (respond_to, response) = oneshot::channel();
        self.control_tx
            .send(ControlRequest { kind, respond_to })
            .map_err(|_| TerminateError::AlreadyReaped)?;

        response.await.unwrap_or(Err(TerminateError::AlreadyReaped))
    }

    /// True once the lifecycle task has observed exit.
    async fn wait_for_exit(&self, limit: Duration) -> bool {
        let mut state_rx = self.state_rx.clone();
        let exited = timeout(limit, state_rx.wait_for(|s| !s.state.is_alive())).await;

        // A closed channel means the lifecycle task is gone, and with it the child
        matches!(exited, Ok(_))
    }
}
