use super::{LauncherConfig, SupervisorConfig};
use launchkit_common::{ConfigError, ConfigResult};
use launchkit_process::validate_environment_key;
use std::path::{Component, Path};

/// Validate supervisor settings
pub fn validate_supervisor_config(config: &SupervisorConfig) -> ConfigResult<()> {
    if config.read_buffer_size == 0 {
        return Err(ConfigError::validation(
            "supervisor.read_buffer_size",
            "must be greater than 0",
        ));
    }

    if config.force_kill_timeout.is_zero() {
        return Err(ConfigError::validation(
            "supervisor.force_kill_timeout",
            "must be greater than 0",
        ));
    }

    Ok(())
}

/// Validate the complete launcher configuration
pub fn validate_launcher_config(config: &LauncherConfig) -> ConfigResult<()> {
    validate_helper_name(&config.helper)?;

    for key in config.environment.keys() {
        validate_environment_key(key)
            .map_err(|reason| ConfigError::validation("environment", reason))?;
    }

    if config.args.iter().any(|arg| arg.contains('\0')) {
        return Err(ConfigError::validation("args", "argument contains a NUL byte"));
    }

    validate_supervisor_config(&config.supervisor)
}

/// The helper is a resource name inside the bundle, not a path.
fn validate_helper_name(helper: &str) -> ConfigResult<()> {
    if helper.trim().is_empty() {
        return Err(ConfigError::validation("helper", "cannot be empty"));
    }

    let mut components = Path::new(helper).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ConfigError::validation(
            "helper",
            format!("must be a plain file name, got: {}", helper),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_launcher_config(&LauncherConfig::for_helper("rust-helper")).is_ok());
    }

    #[test]
    fn test_helper_must_be_a_name() {
        for bad in ["", "  ", "../escape", "/usr/bin/helper", "bin/helper", "."] {
            let config = LauncherConfig::for_helper(bad);
            assert!(
                validate_launcher_config(&config).is_err(),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_zero_force_kill_timeout() {
        let config = SupervisorConfig {
            force_kill_timeout: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        let err = validate_supervisor_config(&config).unwrap_err();
        assert!(err.to_string().contains("force_kill_timeout"));
    }

    #[test]
    fn test_bad_environment_key() {
        let mut config = LauncherConfig::for_helper("helper");
        config.environment.insert("A=B".to_string(), "x".to_string());
        assert!(matches!(
            validate_launcher_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }
}
