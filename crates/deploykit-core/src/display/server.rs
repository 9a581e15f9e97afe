//! Server side of a display session.
//!
//! [`DisplayServer`] launches the companion client, hands it the client ends
//! of a [`DuplexChannel`], and drives it with one request/response exchange
//! at a time.
//!
//! # Threading
//!
//! A session has a single thread of control. Every command takes
//! `&mut self`, so two requests can never interleave on the channel; share a
//! server between threads by wrapping it in a `Mutex` if you must.
//!
//! # Close convention
//!
//! The client answers `Close` with `True` when it accepts the request and is
//! about to exit. `False` is treated as a refusal, which faults the session
//! and terminates the client instead. Closing only happens as part of
//! [`DisplayServer::dispose`] (or drop), and a session that is not `Ready`
//! skips the request and terminates the client directly.

use crate::caller::CallerContext;
use crate::cancel::CancellationToken;
use crate::config::{DisplayConfig, DisplayServerConfig};
use crate::display::channel::{ClientPipeHandles, DuplexChannel};
use crate::display::codec::{self, Command};
use crate::display::dialog::{
    CloseAppsDialogOptions, CloseAppsDialogResult, CustomDialogOptions, DialogBoxOptions,
    DialogBoxResult, DialogRequest, DialogResponse, DialogStyle, InputDialogOptions,
    InputDialogResult, ProgressDialogOptions, ProgressUpdate, RestartDialogOptions,
};
use crate::error::{DeployError, Result};
use crate::process::{LaunchRequest, ProcessSupervisor, SupervisedProcess};
use tracing::{debug, info, warn};

/// Lifecycle of a display session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Opening,
    Ready,
    Closing,
    Closed,
    Faulted,
}

/// Controls one companion display client.
pub struct DisplayServer {
    caller: CallerContext,
    config: DisplayServerConfig,
    channel: DuplexChannel,
    client_handles: Option<ClientPipeHandles>,
    client: Option<SupervisedProcess>,
    state: SessionState,
    is_running: bool,
    disposed: bool,
}

impl DisplayServer {
    /// Allocate the channel for a new session. Nothing is launched until
    /// [`open`](Self::open).
    pub fn new(caller: CallerContext, config: DisplayServerConfig) -> Result<Self> {
        let (channel, client_handles) = DuplexChannel::create()?;
        Ok(Self {
            caller,
            config,
            channel,
            client_handles: Some(client_handles),
            client: None,
            state: SessionState::Created,
            is_running: false,
            disposed: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the client acknowledged `Open` and has not been closed.
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    /// PID of the client, once launched.
    pub fn client_pid(&self) -> Option<u32> {
        self.client.as_ref().map(SupervisedProcess::pid)
    }

    /// Launch the client and perform the `Open` handshake.
    pub fn open(&mut self) -> Result<()> {
        self.require(SessionState::Created, "open")?;
        self.state = SessionState::Opening;

        let Some(handles) = self.client_handles.take() else {
            self.state = SessionState::Faulted;
            return Err(DeployError::invalid_state("client pipe ends already released"));
        };

        let mut request = LaunchRequest::new(&self.config.client_path)
            .with_args([
                DisplayConfig::CLIENT_MODE_ARG.to_string(),
                DisplayConfig::INPUT_PIPE_ARG.to_string(),
                handles.input_arg(),
                DisplayConfig::OUTPUT_PIPE_ARG.to_string(),
                handles.output_arg(),
            ])
            .with_working_dir(self.config.effective_working_dir())
            .with_run_as(self.config.run_as.clone());
        for handle in handles.raw_handles() {
            request = request.with_inherited_handle(handle);
        }

        let supervisor = ProcessSupervisor::new(self.caller.clone());
        let launched = supervisor.launch(&request, CancellationToken::new());
        // The child holds its own copies now (or never will).
        handles.release();
        let client = match launched {
            Ok(client) => client,
            Err(e) => {
                self.state = SessionState::Faulted;
                return Err(e);
            }
        };
        info!("Display client started with PID {}", client.pid());
        self.client = Some(client);

        match self.invoke(&Command::Open).and_then(|line| codec::parse_bool(&line)) {
            Ok(true) => {
                self.is_running = true;
                self.state = SessionState::Ready;
                debug!("Display client acknowledged Open");
                Ok(())
            }
            Ok(false) => {
                self.abandon_open();
                Err(DeployError::Handshake {
                    message: "client not responding".to_string(),
                })
            }
            Err(e) => {
                self.abandon_open();
                Err(e)
            }
        }
    }

    fn abandon_open(&mut self) {
        self.state = SessionState::Faulted;
        if let Err(e) = self.close(true) {
            warn!("Could not stop display client after failed open: {}", e);
        }
    }

    /// Show a dialog and block until the user (or its expiry) answers.
    pub fn show_modal_dialog(
        &mut self,
        style: DialogStyle,
        request: DialogRequest,
    ) -> Result<DialogResponse> {
        self.require(SessionState::Ready, "show a dialog")?;
        let dialog_type = request.dialog_type();
        debug!("Showing {} ({})", dialog_type, style);

        let payload = self.invoke(&Command::ShowModalDialog { style, request })?;
        DialogResponse::decode(dialog_type, &payload).map_err(|e| self.fault(e))
    }

    pub fn show_custom_dialog(
        &mut self,
        style: DialogStyle,
        options: CustomDialogOptions,
    ) -> Result<String> {
        match self.show_modal_dialog(style, DialogRequest::Custom(options))? {
            DialogResponse::Custom(result) => Ok(result),
            other => Err(mismatch(other)),
        }
    }

    pub fn show_input_dialog(
        &mut self,
        style: DialogStyle,
        options: InputDialogOptions,
    ) -> Result<InputDialogResult> {
        match self.show_modal_dialog(style, DialogRequest::Input(options))? {
            DialogResponse::Input(result) => Ok(result),
            other => Err(mismatch(other)),
        }
    }

    pub fn show_restart_dialog(
        &mut self,
        style: DialogStyle,
        options: RestartDialogOptions,
    ) -> Result<String> {
        match self.show_modal_dialog(style, DialogRequest::Restart(options))? {
            DialogResponse::Restart(result) => Ok(result),
            other => Err(mismatch(other)),
        }
    }

    /// Message boxes only exist in the classic style.
    pub fn show_dialog_box(&mut self, options: DialogBoxOptions) -> Result<DialogBoxResult> {
        match self.show_modal_dialog(DialogStyle::Classic, DialogRequest::DialogBox(options))? {
            DialogResponse::DialogBox(result) => Ok(result),
            other => Err(mismatch(other)),
        }
    }

    pub fn show_close_apps_dialog(
        &mut self,
        style: DialogStyle,
        options: CloseAppsDialogOptions,
    ) -> Result<CloseAppsDialogResult> {
        match self.show_modal_dialog(style, DialogRequest::CloseApps(options))? {
            DialogResponse::CloseApps(result) => Ok(result),
            other => Err(mismatch(other)),
        }
    }

    /// Show the non-modal progress dialog. Returns whether it is open.
    pub fn show_progress_dialog(
        &mut self,
        style: DialogStyle,
        options: ProgressDialogOptions,
    ) -> Result<bool> {
        debug!("Showing progress dialog ({})", style);
        self.invoke_bool(
            &Command::ShowProgressDialog { style, options },
            "show a progress dialog",
        )
    }

    pub fn progress_dialog_open(&mut self) -> Result<bool> {
        self.invoke_bool(&Command::ProgressDialogOpen, "query the progress dialog")
    }

    pub fn update_progress_dialog(&mut self, update: ProgressUpdate) -> Result<bool> {
        self.invoke_bool(
            &Command::UpdateProgressDialog(update),
            "update the progress dialog",
        )
    }

    /// Returns whether the dialog is gone.
    pub fn close_progress_dialog(&mut self) -> Result<bool> {
        self.invoke_bool(&Command::CloseProgressDialog, "close the progress dialog")
    }

    /// Shut the client down and wait for it to exit.
    ///
    /// Without `force`, a `Ready` session asks the client first. A refusal or
    /// a broken exchange terminates the client and is returned once it has
    /// exited.
    fn close(&mut self, force: bool) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Err(DeployError::invalid_state(format!(
                "no display client to close in state {:?}",
                self.state
            )));
        };

        let mut outcome = Ok(());
        let mut accepted = false;
        if !force && self.state == SessionState::Ready {
            self.state = SessionState::Closing;
            match self.invoke(&Command::Close).and_then(|line| codec::parse_bool(&line)) {
                Ok(true) => {
                    debug!("Display client accepted Close");
                    accepted = true;
                }
                Ok(false) => {
                    self.state = SessionState::Faulted;
                    outcome = Err(DeployError::Handshake {
                        message: "client refused to close".to_string(),
                    });
                }
                Err(e) => {
                    self.state = SessionState::Faulted;
                    outcome = Err(e);
                }
            }
        }

        if !client.has_exited() {
            if !accepted {
                client.cancel();
            }
            if client.wait_timeout(self.config.exit_timeout).is_none() {
                warn!(
                    "Display client {} still running after {:?}, terminating",
                    client.pid(),
                    self.config.exit_timeout
                );
                client.cancel();
                client.wait();
            }
        }
        debug!("Display client exited with {:?}", client.exit_status());

        self.is_running = false;
        if self.state != SessionState::Faulted {
            self.state = SessionState::Closed;
        }
        outcome
    }

    /// Tear the session down: close (or terminate) the client, wait for it to
    /// exit, then release the channel. Never fails; safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }

        if self.client.is_some() {
            let force = self.state != SessionState::Ready;
            if let Err(e) = self.close(force) {
                warn!("Display client did not close cleanly: {}", e);
            }
        }

        self.disposed = true;
        self.is_running = false;
        self.channel.close();
        self.client_handles.take();
        if self.state != SessionState::Faulted {
            self.state = SessionState::Closed;
        }
    }

    fn require(&self, expected: SessionState, action: &str) -> Result<()> {
        if self.disposed || self.state != expected {
            return Err(DeployError::invalid_state(format!(
                "cannot {action} a display session in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// One request/response exchange. Session-fatal errors fault the session.
    fn invoke(&mut self, command: &Command) -> Result<String> {
        // Encoding errors are the caller's and leave the session usable.
        let line = command.encode()?;
        let exchange = self
            .channel
            .write_line(&line)
            .and_then(|_| self.channel.read_line())
            .and_then(codec::decode_response_line);
        exchange.map_err(|e| self.fault(e))
    }

    fn invoke_bool(&mut self, command: &Command, action: &str) -> Result<bool> {
        self.require(SessionState::Ready, action)?;
        let line = self.invoke(command)?;
        codec::parse_bool(&line).map_err(|e| self.fault(e))
    }

    fn fault(&mut self, error: DeployError) -> DeployError {
        if error.is_session_fatal() {
            warn!("Display session faulted: {}", error);
            self.state = SessionState::Faulted;
            self.is_running = false;
        }
        error
    }
}

impl Drop for DisplayServer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DisplayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayServer")
            .field("state", &self.state)
            .field("is_running", &self.is_running)
            .field("client_pid", &self.client_pid())
            .finish()
    }
}

fn mismatch(response: DialogResponse) -> DeployError {
    DeployError::ChannelFault {
        message: format!("unexpected {} response", response.dialog_type()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::display::dialog::fixtures;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// A session whose client is `/bin/sh` running `script`. The launch
    /// arguments make `client-server` the script path, so the script is
    /// written under that name in the working directory; the pipe handles
    /// arrive as `$2` (read) and `$4` (write).
    fn server_with_script(script: &str) -> (DisplayServer, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DisplayConfig::CLIENT_MODE_ARG), script).unwrap();
        let config = DisplayServerConfig::new("/bin/sh")
            .with_working_dir(dir.path())
            .with_exit_timeout(Duration::from_secs(5));
        let caller = CallerContext::new("tester", 0, false);
        (DisplayServer::new(caller, config).unwrap(), dir)
    }

    const COOPERATIVE: &str = r#"
while IFS= read -r line <&"$2"; do
  case "$line" in
    Open) echo True >&"$4" ;;
    Close) echo True >&"$4"; exit 0 ;;
    ShowModalDialog\|CustomDialog*) echo IkRldGFpbHMi >&"$4" ;;
    ShowModalDialog\|RestartDialog*) echo "ERROR|renderer unavailable" >&"$4" ;;
    ShowProgressDialog\|*) progress=True; echo True >&"$4" ;;
    ProgressDialogOpen) echo "${progress:-False}" >&"$4" ;;
    UpdateProgressDialog\|*) echo "${progress:-False}" >&"$4" ;;
    CloseProgressDialog) progress=False; echo True >&"$4" ;;
    *) echo "Error|unsupported" >&"$4" ;;
  esac
done
"#;

    #[test]
    fn test_full_session() {
        let (mut server, _dir) = server_with_script(COOPERATIVE);
        assert_eq!(server.state(), SessionState::Created);

        server.open().unwrap();
        assert!(server.is_running());
        assert_eq!(server.state(), SessionState::Ready);

        let result = server
            .show_custom_dialog(DialogStyle::Fluent, fixtures::custom())
            .unwrap();
        assert_eq!(result, "Details");

        let pid = server.client_pid().unwrap();
        server.close(false).unwrap();
        assert!(!server.is_running());
        assert_eq!(server.state(), SessionState::Closed);
        assert!(!crate::platform::is_process_alive(pid));
        server.dispose();
        assert_eq!(server.state(), SessionState::Closed);
    }

    #[test]
    fn test_progress_dialog_session() {
        let (mut server, _dir) = server_with_script(COOPERATIVE);
        assert!(matches!(
            server.progress_dialog_open(),
            Err(DeployError::InvalidState { .. })
        ));
        server.open().unwrap();

        assert!(!server.progress_dialog_open().unwrap());
        assert!(server
            .show_progress_dialog(DialogStyle::Fluent, fixtures::progress())
            .unwrap());
        assert!(server.progress_dialog_open().unwrap());

        let update = ProgressUpdate::new()
            .with_message("Almost there | nearly")
            .with_percentage(90.0)
            .unwrap();
        assert!(server.update_progress_dialog(update).unwrap());
        assert!(server.close_progress_dialog().unwrap());
        assert!(!server.progress_dialog_open().unwrap());

        // A bad update never reaches the client.
        let update = ProgressUpdate {
            percentage: Some(120.0),
            ..ProgressUpdate::new()
        };
        assert!(matches!(
            server.update_progress_dialog(update),
            Err(DeployError::Validation { .. })
        ));
        assert_eq!(server.state(), SessionState::Ready);
    }

    #[test]
    fn test_forced_close_skips_the_handshake() {
        let script = r#"
while IFS= read -r line <&"$2"; do
  echo "$line" >> requests.log
  case "$line" in
    Open) echo True >&"$4" ;;
    Close) echo True >&"$4"; exit 0 ;;
  esac
done
"#;
        let (mut server, dir) = server_with_script(script);
        server.open().unwrap();
        let pid = server.client_pid().unwrap();

        server.close(true).unwrap();
        assert_eq!(server.state(), SessionState::Closed);
        assert!(!crate::platform::is_process_alive(pid));
        let requests = std::fs::read_to_string(dir.path().join("requests.log")).unwrap();
        assert_eq!(requests, "Open\n");

        // Nothing left to close.
        assert!(matches!(server.close(false), Err(DeployError::InvalidState { .. })));
    }

    #[test]
    fn test_remote_error_keeps_session_ready() {
        let (mut server, _dir) = server_with_script(COOPERATIVE);
        server.open().unwrap();

        let options =
            RestartDialogOptions::new(fixtures::base(), fixtures::restart_strings()).unwrap();
        match server.show_restart_dialog(DialogStyle::Classic, options) {
            Err(DeployError::Remote { message }) => assert_eq!(message, "renderer unavailable"),
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(server.state(), SessionState::Ready);
        assert!(server.is_running());
    }

    #[test]
    fn test_commands_require_an_open_session() {
        let (mut server, _dir) = server_with_script(COOPERATIVE);
        assert!(matches!(server.close(false), Err(DeployError::InvalidState { .. })));
        assert!(matches!(
            server.show_custom_dialog(DialogStyle::Classic, fixtures::custom()),
            Err(DeployError::InvalidState { .. })
        ));

        server.open().unwrap();
        assert!(matches!(server.open(), Err(DeployError::InvalidState { .. })));
    }

    #[test]
    fn test_open_then_dispose_terminates_client() {
        let (mut server, _dir) = server_with_script(COOPERATIVE);
        server.open().unwrap();
        let pid = server.client_pid().unwrap();

        server.dispose();
        assert!(!server.is_running());
        assert!(!crate::platform::is_process_alive(pid));
        server.dispose();
    }

    #[test]
    fn test_refused_open_faults_and_drop_terminates() {
        let script = r#"
read -r line <&"$2"
echo False >&"$4"
cat <&"$2" >/dev/null
"#;
        let (mut server, _dir) = server_with_script(script);
        match server.open() {
            Err(DeployError::Handshake { message }) => assert_eq!(message, "client not responding"),
            other => panic!("expected handshake failure, got {other:?}"),
        }
        assert_eq!(server.state(), SessionState::Faulted);
        assert!(!server.is_running());
        assert_eq!(server.client_pid(), None);

        let started = Instant::now();
        drop(server);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_refused_close_falls_back_to_termination() {
        let script = r#"
while IFS= read -r line <&"$2"; do
  case "$line" in
    Open) echo True >&"$4" ;;
    Close) echo False >&"$4" ;;
  esac
done
"#;
        let (mut server, _dir) = server_with_script(script);
        server.open().unwrap();
        let pid = server.client_pid().unwrap();
        match server.close(false) {
            Err(DeployError::Handshake { message }) => assert_eq!(message, "client refused to close"),
            other => panic!("expected refusal, got {other:?}"),
        }
        assert_eq!(server.state(), SessionState::Faulted);
        assert!(!crate::platform::is_process_alive(pid));
        server.dispose();
    }

    #[test]
    fn test_client_exiting_early_is_a_channel_fault() {
        let (mut server, _dir) = server_with_script("exit 0\n");
        assert!(matches!(server.open(), Err(DeployError::ChannelFault { .. })));
        assert_eq!(server.state(), SessionState::Faulted);
    }

    #[test]
    fn test_missing_client_is_a_launch_failure() {
        let caller = CallerContext::new("tester", 0, false);
        let config = DisplayServerConfig::new("/nonexistent/deploykit-display");
        let mut server = DisplayServer::new(caller, config).unwrap();
        assert!(matches!(server.open(), Err(DeployError::LaunchFailed { .. })));
        assert_eq!(server.state(), SessionState::Faulted);
    }
}
