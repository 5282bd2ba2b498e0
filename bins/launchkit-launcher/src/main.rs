use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use launchkit_log_collection::{FanoutSink, FileSink, OutputSink, TracingSink};
use launchkit_process::resolve_bundled_resource;
use launchkit_supervisor::config::parse_duration;
use launchkit_supervisor::{ChildProcessSupervisor, LaunchSpec, LauncherConfig};

/// Launch a bundled helper and relay its output to the log
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Helper executable name, resolved next to this launcher (overrides config)
    #[arg(long, required_unless_present = "config")]
    helper: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Time between SIGTERM and SIGKILL on shutdown, e.g. "2s" (overrides config)
    #[arg(long, value_parser = parse_duration)]
    grace_period: Option<Duration>,

    /// Arguments passed through to the helper (replace configured args)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    helper_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    let config = load_config(&args)?;
    info!("Launching helper: {}", config.helper);

    let helper_path = match resolve_bundled_resource(&config.helper) {
        Ok(path) => path,
        Err(e) => {
            error!("Cannot launch helper: {}", e);
            std::process::exit(1);
        }
    };

    let spec = LaunchSpec::new(helper_path)
        .args(config.args.iter().cloned())
        .env("RUST_BACKTRACE", "1")
        .envs(config.environment.clone());

    let sink = build_sink(&config)?;
    let supervisor = ChildProcessSupervisor::new(config.supervisor.clone());
    let process = supervisor
        .launch(spec, sink)
        .await
        .with_context(|| format!("Failed to launch helper {}", config.helper))?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let report = tokio::select! {
        report = process.wait() => report,
        _ = &mut shutdown => {
            info!("Stopping helper (grace period {:?})", config.grace_period);
            if let Err(e) = process.terminate(config.grace_period).await {
                warn!("Helper did not stop cleanly: {}", e);
            }
            process.wait().await
        }
    };

    if report.partial_delivery {
        warn!("Some helper output may not have been logged");
    }
    info!(
        exit_code = report.exit_code,
        signaled = report.signaled,
        "Helper exited after {:?}",
        report.duration
    );

    std::process::exit(report.exit_code);
}

fn load_config(args: &Args) -> Result<LauncherConfig> {
    let mut config = match (&args.config, &args.helper) {
        (Some(path), _) => {
            info!("Config file: {}", path.display());
            LauncherConfig::load_from_file(path)?
        }
        (None, Some(helper)) => LauncherConfig::for_helper(helper.clone()),
        (None, None) => anyhow::bail!("Either --config or --helper is required"),
    };

    if let Some(ref helper) = args.helper {
        config.helper = helper.clone();
    }
    if let Some(grace_period) = args.grace_period {
        config.grace_period = grace_period;
    }
    if !args.helper_args.is_empty() {
        config.args = args.helper_args.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Child output goes to the log, and also to `log_file` when one is set.
fn build_sink(config: &LauncherConfig) -> Result<Arc<dyn OutputSink>> {
    let log_sink: Arc<dyn OutputSink> = Arc::new(TracingSink::new(config.helper.clone()));

    match config.log_file {
        Some(ref path) => {
            let file_sink = FileSink::new(path, config.helper.clone())
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            info!("Writing helper output to {}", file_sink.path().display());

            Ok(Arc::new(
                FanoutSink::new().with(log_sink).with(Arc::new(file_sink)),
            ))
        }
        None => Ok(log_sink),
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Resolves on SIGTERM or SIGINT. Never resolves if the handlers cannot be
/// installed, so the helper is left running rather than stopped.
async fn shutdown_signal() {
    if let Err(e) = wait_for_signal().await {
        warn!("Signal handling unavailable: {:#}", e);
        std::future::pending::<()>().await;
    }
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM signal"),
            _ = sigint.recv() => info!("Received SIGINT signal"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchkit_log_collection::OutputChunk;
    use launchkit_supervisor::OutputStream;
    use tempfile::tempdir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("launchkit-launcher").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_helper_or_config_required() {
        assert!(Args::try_parse_from(["launchkit-launcher"]).is_err());
    }

    #[test]
    fn test_cli_only_uses_defaults() {
        let config = load_config(&parse(&["--helper", "rust-helper"])).unwrap();

        assert_eq!(config, LauncherConfig::for_helper("rust-helper"));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("launcher.yaml");
        std::fs::write(
            &path,
            "helper: from-file\nargs: [\"--port\", \"9000\"]\ngrace_period: 10s\n",
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let from_file = load_config(&parse(&["--config", path])).unwrap();
        assert_eq!(from_file.helper, "from-file");
        assert_eq!(from_file.args, vec!["--port", "9000"]);
        assert_eq!(from_file.grace_period, Duration::from_secs(10));

        let overridden = load_config(&parse(&[
            "--config",
            path,
            "--helper",
            "from-cli",
            "--grace-period",
            "750ms",
            "--",
            "--verbose",
            "-x",
        ]))
        .unwrap();
        assert_eq!(overridden.helper, "from-cli");
        assert_eq!(overridden.grace_period, Duration::from_millis(750));
        assert_eq!(overridden.args, vec!["--verbose", "-x"]);
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let bad_duration =
            Args::try_parse_from(["launchkit-launcher", "--helper", "h", "--grace-period", "soon"]);
        assert!(bad_duration.is_err());
        assert!(load_config(&parse(&["--helper", "../escape"])).is_err());
    }

    #[tokio::test]
    async fn test_sink_writes_through_to_log_file() {
        let dir = tempdir().unwrap();
        let log_file = dir.path().join("logs/helper.log");
        let mut config = LauncherConfig::for_helper("helper");
        config.log_file = Some(log_file.clone());

        let sink = build_sink(&config).unwrap();
        sink.deliver(OutputChunk::new(OutputStream::Stdout, b"ready\n".to_vec(), 1))
            .await
            .unwrap();
        sink.deliver(OutputChunk::new(OutputStream::Stderr, b"careful".to_vec(), 1))
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let content = std::fs::read_to_string(&log_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[helper/stdout #1] ready"));
        assert!(lines[1].ends_with("[helper/stderr #1] careful"));
    }
}
