//! Launching and supervising a child process.
//!
//! A launched process gets a watcher thread that publishes its exit and
//! terminates it when the launch's cancellation token fires. Callers observe
//! the exit through [`SupervisedProcess`].

#![allow(unsafe_code)]

use crate::caller::CallerContext;
use crate::cancel::CancellationToken;
use crate::config::DisplayConfig;
use crate::error::{DeployError, Result};
use crate::platform::RawPipeHandle;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, SendError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Account a process should run as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAsAccount {
    pub user_name: String,
    /// Interactive session to start in (Windows).
    pub session_id: Option<u32>,
    /// Numeric ids (Unix); resolved from `user_name` when absent.
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl RunAsAccount {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            session_id: None,
            uid: None,
            gid: None,
        }
    }

    pub fn with_session(mut self, session_id: u32) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_ids(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    /// Whether launching under this account means leaving the caller's identity.
    fn differs_from(&self, caller: &CallerContext) -> bool {
        let other_session = self
            .session_id
            .is_some_and(|session| session != caller.session_id);
        other_session || !caller.is_same_user(&self.user_name)
    }
}

/// What to launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub run_as: Option<RunAsAccount>,
    /// Handles the child must inherit (and no other process).
    pub inherit_handles: Vec<RawPipeHandle>,
    pub env_vars: Vec<(String, String)>,
}

impl LaunchRequest {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            working_dir: None,
            run_as: None,
            inherit_handles: Vec::new(),
            env_vars: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_working_dir(mut self, dir: Option<impl AsRef<Path>>) -> Self {
        self.working_dir = dir.map(|d| d.as_ref().to_path_buf());
        self
    }

    pub fn with_run_as(mut self, account: Option<RunAsAccount>) -> Self {
        self.run_as = account;
        self
    }

    pub fn with_inherited_handle(mut self, handle: RawPipeHandle) -> Self {
        self.inherit_handles.push(handle);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when killed by a signal or unobservable.
    pub code: Option<i32>,
    /// Whether termination was requested through the token.
    pub cancelled: bool,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Default)]
struct ExitSignal {
    exit: Mutex<Option<ProcessExit>>,
    signal: Condvar,
}

impl ExitSignal {
    fn publish(&self, exit: ProcessExit) {
        *self.exit.lock().unwrap_or_else(PoisonError::into_inner) = Some(exit);
        self.signal.notify_all();
    }
}

enum ChildHandle {
    Std(Child),
    #[cfg(windows)]
    Session(crate::platform::session::SessionChild),
}

impl ChildHandle {
    fn id(&self) -> u32 {
        match self {
            ChildHandle::Std(child) => child.id(),
            #[cfg(windows)]
            ChildHandle::Session(child) => child.id(),
        }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<Option<i32>>> {
        match self {
            ChildHandle::Std(child) => Ok(child.try_wait()?.map(|status| status.code())),
            #[cfg(windows)]
            ChildHandle::Session(child) => Ok(child.wait_timeout(Duration::ZERO)?.map(Some)),
        }
    }

    fn kill(&mut self) -> std::io::Result<()> {
        match self {
            ChildHandle::Std(child) => child.kill(),
            #[cfg(windows)]
            ChildHandle::Session(child) => child.kill(),
        }
    }

    /// Kill and reap a child that has no watcher.
    fn abandon(&mut self) {
        let pid = self.id();
        if let Err(e) = self.kill() {
            warn!("Failed to terminate process {}: {}", pid, e);
        }
        let reaped = match self {
            ChildHandle::Std(child) => child.wait().map(drop),
            #[cfg(windows)]
            ChildHandle::Session(child) => child.wait_timeout(Duration::from_secs(5)).map(drop),
        };
        if let Err(e) = reaped {
            warn!("Failed to reap process {}: {}", pid, e);
        }
    }
}

/// Give `child` to the watcher that `start` launches. If the watcher never
/// receives it, the child is killed before the error is returned.
fn hand_off(
    child: ChildHandle,
    start: impl FnOnce(mpsc::Receiver<ChildHandle>) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let (sender, receiver) = mpsc::sync_channel(1);
    let (mut orphan, error) = match start(receiver) {
        Ok(()) => match sender.send(child) {
            Ok(()) => return Ok(()),
            Err(SendError(child)) => (
                child,
                std::io::Error::other("supervisor thread exited before taking the process"),
            ),
        },
        Err(e) => (child, e),
    };
    warn!("Process {} has no supervisor: {}", orphan.id(), error);
    orphan.abandon();
    Err(error)
}

/// A running (or finished) child process under supervision.
pub struct SupervisedProcess {
    pid: u32,
    program: PathBuf,
    token: CancellationToken,
    exit: Arc<ExitSignal>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the process has exited.
    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Exit information, once the process has exited.
    pub fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit.exit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exit code, once the process has exited with one.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status().and_then(|exit| exit.code)
    }

    /// Request termination. Returns immediately; use `wait` to observe it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the process exits.
    pub fn wait(&self) -> ProcessExit {
        let mut exit = self.exit.exit.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(exit) = *exit {
                return exit;
            }
            exit = self
                .exit
                .signal
                .wait(exit)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the process exits or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ProcessExit> {
        let deadline = Instant::now() + timeout;
        let mut exit = self.exit.exit.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(exit) = *exit {
                return Some(exit);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            exit = match self.exit.signal.wait_timeout(exit, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl std::fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("exit", &self.exit_status())
            .finish()
    }
}

/// Launches processes on behalf of a caller.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    caller: CallerContext,
    poll_interval: Duration,
}

impl ProcessSupervisor {
    pub fn new(caller: CallerContext) -> Self {
        Self {
            caller,
            poll_interval: DisplayConfig::SUPERVISOR_POLL_INTERVAL,
        }
    }

    /// Launch `request`; cancelling `token` terminates the process.
    ///
    /// A launch failure is returned as [`DeployError::LaunchFailed`] and never
    /// retried. A token that is already cancelled launches nothing.
    pub fn launch(&self, request: &LaunchRequest, token: CancellationToken) -> Result<SupervisedProcess> {
        token.check()?;
        let child = self.spawn(request)?;
        let pid = child.id();
        info!("Launched {} with PID {}", request.program.display(), pid);

        let exit = Arc::new(ExitSignal::default());
        let watcher_exit = exit.clone();
        let watcher_token = token.clone();
        let poll_interval = self.poll_interval;

        hand_off(child, |receiver| {
            std::thread::Builder::new()
                .name(format!("supervise-{pid}"))
                .spawn(move || {
                    if let Ok(child) = receiver.recv() {
                        watch_child(child, watcher_token, watcher_exit, poll_interval);
                    }
                })
                .map(drop)
        })
        .map_err(|e| DeployError::LaunchFailed {
                app: request.program.display().to_string(),
                message: format!("failed to start supervisor thread: {e}"),
            })?;

        Ok(SupervisedProcess {
            pid,
            program: request.program.clone(),
            token,
            exit,
        })
    }

    fn spawn(&self, request: &LaunchRequest) -> Result<ChildHandle> {
        let launch_error = |message: String| DeployError::LaunchFailed {
            app: request.program.display().to_string(),
            message,
        };

        let run_as = request
            .run_as
            .as_ref()
            .filter(|account| account.differs_from(&self.caller));

        #[cfg(windows)]
        {
            let target_session = run_as.and_then(|account| account.session_id);
            if let Some(session_id) = target_session.filter(|id| *id != self.caller.session_id) {
                let child = crate::platform::session::spawn_in_session(
                    session_id,
                    &request.program,
                    &request.args,
                    request.working_dir.as_deref(),
                    &request.env_vars,
                )?;
                return Ok(ChildHandle::Session(child));
            }
        }

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.env_vars.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            if let Some(account) = run_as {
                let (uid, gid) = resolve_ids(account).map_err(launch_error)?;
                debug!("Launching as {} (uid {}, gid {})", account.user_name, uid, gid);
                cmd.uid(uid).gid(gid);
            }

            let inherit = request.inherit_handles.clone();
            if !inherit.is_empty() {
                // SAFETY: the closure only calls fcntl, which is async-signal-safe,
                // on descriptors the parent keeps open until after spawn.
                unsafe {
                    cmd.pre_exec(move || {
                        for fd in &inherit {
                            crate::platform::pipe::clear_cloexec(*fd)?;
                        }
                        Ok(())
                    });
                }
            }
        }

        #[cfg(windows)]
        {
            if let Some(account) = run_as {
                warn!(
                    "Cannot switch to {} within the current session, launching as the caller",
                    account.user_name
                );
            }
        }

        cmd.spawn().map(ChildHandle::Std).map_err(|e| {
            error!("Failed to spawn {}: {}", request.program.display(), e);
            launch_error(e.to_string())
        })
    }
}

#[cfg(unix)]
fn resolve_ids(account: &RunAsAccount) -> std::result::Result<(u32, u32), String> {
    if let (Some(uid), Some(gid)) = (account.uid, account.gid) {
        return Ok((uid, gid));
    }
    let user = nix::unistd::User::from_name(&account.user_name)
        .map_err(|e| format!("cannot look up user {}: {}", account.user_name, e))?
        .ok_or_else(|| format!("unknown user {}", account.user_name))?;
    Ok((
        account.uid.unwrap_or(user.uid.as_raw()),
        account.gid.unwrap_or(user.gid.as_raw()),
    ))
}

fn watch_child(
    mut child: ChildHandle,
    token: CancellationToken,
    exit: Arc<ExitSignal>,
    poll_interval: Duration,
) {
    let pid = child.id();
    let mut kill_sent = false;

    loop {
        match child.try_wait() {
            Ok(Some(code)) => {
                debug!("Process {} exited with {:?}", pid, code);
                exit.publish(ProcessExit {
                    code,
                    cancelled: kill_sent,
                });
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Lost track of process {}: {}", pid, e);
                exit.publish(ProcessExit {
                    code: None,
                    cancelled: kill_sent,
                });
                return;
            }
        }

        if token.is_cancelled() {
            if !kill_sent {
                debug!("Terminating process {}", pid);
                if let Err(e) = child.kill() {
                    warn!("Failed to terminate process {}: {}", pid, e);
                }
                kill_sent = true;
            }
            std::thread::sleep(poll_interval);
        } else {
            token.wait_timeout(poll_interval);
        }
    }
}
