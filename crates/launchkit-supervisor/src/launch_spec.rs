//! What to launch.

use launchkit_common::{LaunchError, LaunchResult};
use launchkit_process::{validate_environment_key, validate_executable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Description of the child to start.
///
/// `environment` is merged onto the supervisor's own environment; keys given
/// here win, nothing inherited is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub executable_path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            args: Vec::new(),
            environment: BTreeMap::new(),
            working_directory: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Short name used in log lines: the executable's file name.
    pub fn label(&self) -> String {
        self.executable_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable_path.display().to_string())
    }

    /// Check everything that can be checked without creating a process.
    ///
    /// A missing or non-executable file is `ExecutableNotFound`; a bad
    /// environment key is `InvalidSpec`. The working directory is left to
    /// the OS and surfaces as `SpawnFailed`.
    pub fn validate(&self) -> LaunchResult<()> {
        validate_executable(Path::new(&self.executable_path))?;

        for key in self.environment.keys() {
            validate_environment_key(key).map_err(LaunchError::invalid_spec)?;
        }

        if self.args.iter().any(|arg| arg.contains('\0')) {
            return Err(LaunchError::invalid_spec("argument contains a NUL byte"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let spec = LaunchSpec::new("/opt/app/helper")
            .arg("--port")
            .args(["8080", "--verbose"])
            .env("RUST_BACKTRACE", "1")
            .envs([("A", "1"), ("B", "2")])
            .working_directory("/tmp");

        assert_eq!(spec.args, vec!["--port", "8080", "--verbose"]);
        assert_eq!(spec.environment.len(), 3);
        assert_eq!(spec.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.label(), "helper");
    }

    #[test]
    fn test_missing_executable() {
        let spec = LaunchSpec::new("/definitely/not/here/helper");
        assert_eq!(
            spec.validate().unwrap_err(),
            LaunchError::executable_not_found("/definitely/not/here/helper")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_environment_key() {
        let spec = LaunchSpec::new("/bin/sh").env("BAD=KEY", "x");
        assert!(matches!(
            spec.validate().unwrap_err(),
            LaunchError::InvalidSpec { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_valid_spec() {
        let spec = LaunchSpec::new("/bin/sh").arg("-c").arg("true").env("FOO", "bar");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_deserialize_defaults() {
        let spec: LaunchSpec = serde_yaml::from_str("executable_path: /opt/app/helper\n").unwrap();
        assert!(spec.args.is_empty());
        assert!(spec.environment.is_empty());
        assert!(spec.working_directory.is_none());
    }
}
