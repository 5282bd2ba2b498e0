//! Spawning a child and wiring up its tasks.

use crate::config::SupervisorConfig;
use crate::launch_spec::LaunchSpec;
use crate::lifecycle::LifecycleTask;
use crate::running::RunningProcess;
use chrono::Utc;
use launchkit_common::{LaunchError, LaunchResult, OutputStream};
use launchkit_log_collection::{drain_stream, DrainSummary, OutputSink, StreamProgress};
use launchkit_process::{inherited_environment, validate_executable};
use launchkit_process_state::ProcessStateMachine;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Launches children and supervises them until they are reaped.
///
/// The supervisor itself holds only configuration; every launched child is
/// tracked by its own [`RunningProcess`] and background tasks.
#[derive(Debug, Clone, Default)]
pub struct ChildProcessSupervisor {
    config: SupervisorConfig,
}

impl ChildProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start `spec` with piped stdout/stderr delivered to `sink`.
    ///
    /// The executable is checked before anything is created, so an
    /// `ExecutableNotFound` error leaves no process, pipe or task behind and
    /// never touches the sink. Must be called inside a Tokio runtime.
    pub async fn launch(
        &self,
        spec: LaunchSpec,
        sink: Arc<dyn OutputSink>,
    ) -> LaunchResult<RunningProcess> {
        spec.validate()?;

        let name = spec.label();
        info!("Spawning process: {}", name);

        let mut cmd = Command::new(&spec.executable_path);
        cmd.args(&spec.args)
            .env_clear()
            .envs(inherited_environment(&spec.environment))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(ref wd) = spec.working_directory {
            cmd.current_dir(wd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(&spec.executable_path, e))?;
        let started_at = Instant::now();
        let pid = child.id().unwrap_or(0);
        let label = format!("{}[{}]", name, pid);

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                // Kill + reap in the background; nothing else owns this child
                let _ = child.start_kill();
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                return Err(LaunchError::spawn_failed(
                    &spec.executable_path,
                    "output pipes were not created",
                ));
            }
        };

        let stdout_progress = Arc::new(StreamProgress::new(OutputStream::Stdout));
        let stderr_progress = Arc::new(StreamProgress::new(OutputStream::Stderr));

        let stdout_task = self.spawn_drain(stdout, OutputStream::Stdout, &label, &sink, &stdout_progress);
        let stderr_task = self.spawn_drain(stderr, OutputStream::Stderr, &label, &sink, &stderr_progress);

        let machine = ProcessStateMachine::new(label.clone());
        let (state_tx, state_rx) = watch::channel(machine.snapshot());
        let (report_tx, report_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        tokio::spawn(
            LifecycleTask {
                child,
                label: label.clone(),
                started_at,
                machine,
                stdout_task,
                stderr_task,
                control_rx,
                state_tx,
                report_tx,
            }
            .run(),
        );

        info!("Process spawned successfully: {} (PID: {})", name, pid);

        Ok(RunningProcess {
            pid,
            label,
            started_at: Utc::now(),
            control_tx,
            state_rx,
            report_rx,
            stdout_progress,
            stderr_progress,
            force_kill_timeout: self.config.force_kill_timeout,
        })
    }

    fn spawn_drain<R>(
        &self,
        reader: R,
        stream: OutputStream,
        label: &str,
        sink: &Arc<dyn OutputSink>,
        progress: &Arc<StreamProgress>,
    ) -> JoinHandle<DrainSummary>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let label = label.to_string();
        let sink = Arc::clone(sink);
        let progress = Arc::clone(progress);
        let options = self.config.drain_options();

        debug!("{} collection started for {}", stream, label);

        tokio::spawn(async move {
            drain_stream(reader, stream, &label, sink, options, progress).await
        })
    }
}

/// A `NotFound` from spawn is either the executable vanishing after
/// validation or a missing working directory; only the first is
/// `ExecutableNotFound`.
fn spawn_error(path: &Path, e: io::Error) -> LaunchError {
    if e.kind() == io::ErrorKind::NotFound {
        if let Err(not_found @ LaunchError::ExecutableNotFound { .. }) = validate_executable(path) {
            return not_found;
        }
    }
    LaunchError::spawn_failed(path, e.to_string())
}
