//! Centralized configuration for DeployKit.
//!
//! Constants for the display protocol, client supervision and process
//! monitoring, plus the per-session `DisplayServerConfig`.

use crate::error::{DeployError, Result};
use crate::process::RunAsAccount;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "DeployKit";
}

/// Display client invocation and supervision settings.
pub struct DisplayConfig;

impl DisplayConfig {
    /// File name (without platform suffix) of the companion client executable.
    pub const CLIENT_EXECUTABLE_NAME: &'static str = "deploykit-display";
    /// Mode argument that puts the companion into pipe client mode.
    pub const CLIENT_MODE_ARG: &'static str = "client-server";
    pub const INPUT_PIPE_ARG: &'static str = "--input-pipe";
    pub const OUTPUT_PIPE_ARG: &'static str = "--output-pipe";

    /// How long disposal waits for a closed client before terminating it.
    pub const CLIENT_EXIT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Granularity of the supervisor's exit/cancel checks.
    pub const SUPERVISOR_POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Running-process monitor settings.
pub struct ProcessMonitorConfig;

impl ProcessMonitorConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
}

/// Configuration for one display server session.
#[derive(Debug, Clone)]
pub struct DisplayServerConfig {
    /// Path to the companion client executable.
    pub client_path: PathBuf,
    /// Working directory for the client (defaults to the client's directory).
    pub working_dir: Option<PathBuf>,
    /// Account to launch the client under, when it differs from the caller.
    pub run_as: Option<RunAsAccount>,
    /// Grace period between a close request and forced termination.
    pub exit_timeout: Duration,
}

impl DisplayServerConfig {
    /// Create a config for the client at `client_path`.
    pub fn new(client_path: impl AsRef<Path>) -> Self {
        Self {
            client_path: client_path.as_ref().to_path_buf(),
            working_dir: None,
            run_as: None,
            exit_timeout: DisplayConfig::CLIENT_EXIT_TIMEOUT,
        }
    }

    /// Locate the companion client next to the running executable.
    pub fn beside_current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().ok_or_else(|| {
            DeployError::validation("client_path", "current executable has no parent directory")
        })?;
        Ok(Self::new(dir.join(format!(
            "{}{}",
            DisplayConfig::CLIENT_EXECUTABLE_NAME,
            std::env::consts::EXE_SUFFIX
        ))))
    }

    /// Set the client working directory.
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Launch the client under another account.
    pub fn with_run_as(mut self, account: RunAsAccount) -> Self {
        self.run_as = Some(account);
        self
    }

    /// Set the grace period before a closing client is terminated.
    pub fn with_exit_timeout(mut self, timeout: Duration) -> Self {
        self.exit_timeout = timeout;
        self
    }

    /// Working directory the client is started in.
    pub fn effective_working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .clone()
            .or_else(|| self.client_path.parent().map(Path::to_path_buf))
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_dir_defaults_to_client_dir() {
        let config = DisplayServerConfig::new("/opt/deploykit/deploykit-display");
        assert_eq!(
            config.effective_working_dir(),
            Some(PathBuf::from("/opt/deploykit"))
        );

        let config = config.with_working_dir("/tmp");
        assert_eq!(config.effective_working_dir(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_bare_client_name_has_no_working_dir() {
        let config = DisplayServerConfig::new("deploykit-display");
        assert_eq!(config.effective_working_dir(), None);
    }

    #[test]
    fn test_beside_current_exe_uses_client_name() {
        let config = DisplayServerConfig::beside_current_exe().unwrap();
        let name = config.client_path.file_stem().unwrap().to_string_lossy();
        assert_eq!(name, DisplayConfig::CLIENT_EXECUTABLE_NAME);
    }
}
