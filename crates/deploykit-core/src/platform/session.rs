//! Launching a process into another user's interactive session (Windows).
//!
//! The deployment engine usually runs as SYSTEM in session 0, where no UI is
//! visible. To show dialogs, the display client is started with the token of
//! the user logged on to the target session.

#![cfg(windows)]
#![allow(unsafe_code)]

use crate::error::{DeployError, Result};
use crate::process::command_line::argv_to_command_line;
use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};
use windows_sys::Win32::System::RemoteDesktop::WTSQueryUserToken;
use windows_sys::Win32::System::Threading::{
    CreateProcessAsUserW, GetExitCodeProcess, TerminateProcess, WaitForSingleObject,
    CREATE_UNICODE_ENVIRONMENT, PROCESS_INFORMATION, STARTUPINFOW,
};

/// A process started with `CreateProcessAsUserW`.
#[derive(Debug)]
pub struct SessionChild {
    process: OwnedHandle,
    pid: u32,
}

impl SessionChild {
    pub fn id(&self) -> u32 {
        self.pid
    }

    fn raw(&self) -> HANDLE {
        self.process.as_raw_handle() as HANDLE
    }

    /// Wait up to `timeout` for exit; returns the exit code once exited.
    pub fn wait_timeout(&self, timeout: Duration) -> std::io::Result<Option<i32>> {
        let millis = timeout.as_millis().min(u32::MAX as u128 - 1) as u32;
        // SAFETY: the process handle stays open for the lifetime of self.
        match unsafe { WaitForSingleObject(self.raw(), millis) } {
            WAIT_OBJECT_0 => {
                let mut code = 0u32;
                // SAFETY: `code` is a valid out pointer.
                if unsafe { GetExitCodeProcess(self.raw(), &mut code) } == 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(Some(code as i32))
            }
            WAIT_TIMEOUT => Ok(None),
            _ => Err(std::io::Error::last_os_error()),
        }
    }

    pub fn kill(&self) -> std::io::Result<()> {
        // SAFETY: the process handle stays open for the lifetime of self.
        if unsafe { TerminateProcess(self.raw(), 1) } == 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(Some(0)).collect()
}

fn launch_error(program: &Path, message: impl Into<String>) -> DeployError {
    DeployError::LaunchFailed {
        app: program.display().to_string(),
        message: message.into(),
    }
}

/// Start `program` in `session_id` as the user logged on there.
///
/// Inheritable handles of the caller are inherited by the new process.
pub fn spawn_in_session(
    session_id: u32,
    program: &Path,
    args: &[String],
    working_dir: Option<&Path>,
    env_vars: &[(String, String)],
) -> Result<SessionChild> {
    if !env_vars.is_empty() {
        warn!(
            "Ignoring {} environment overrides for session launch of {}",
            env_vars.len(),
            program.display()
        );
    }

    let mut token: HANDLE = std::ptr::null_mut();
    // SAFETY: `token` is a valid out pointer.
    if unsafe { WTSQueryUserToken(session_id, &mut token) } == 0 {
        return Err(launch_error(
            program,
            format!(
                "no user token for session {session_id}: {}",
                std::io::Error::last_os_error()
            ),
        ));
    }
    // SAFETY: WTSQueryUserToken returned a primary token we now own.
    let token = unsafe { OwnedHandle::from_raw_handle(token as RawHandle) };

    let mut environment: *mut c_void = std::ptr::null_mut();
    // SAFETY: `environment` is a valid out pointer; the token is open.
    if unsafe { CreateEnvironmentBlock(&mut environment, token.as_raw_handle() as HANDLE, 0) } == 0 {
        debug!("CreateEnvironmentBlock failed, inheriting the caller's environment");
        environment = std::ptr::null_mut();
    }

    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(program.display().to_string());
    argv.extend(args.iter().cloned());
    let mut command_line = wide(&argv_to_command_line(&argv));

    let directory: Option<Vec<u16>> = working_dir
        .map(|dir| dir.as_os_str().encode_wide().chain(Some(0)).collect());
    let mut desktop = wide("winsta0\\default");

    // SAFETY: all-zero is a valid STARTUPINFOW / PROCESS_INFORMATION.
    let mut startup: STARTUPINFOW = unsafe { std::mem::zeroed() };
    startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
    startup.lpDesktop = desktop.as_mut_ptr();
    let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

    // SAFETY: every pointer references a live, NUL-terminated local buffer or is null.
    let created = unsafe {
        CreateProcessAsUserW(
            token.as_raw_handle() as HANDLE,
            std::ptr::null(),
            command_line.as_mut_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            1,
            CREATE_UNICODE_ENVIRONMENT,
            environment,
            directory.as_ref().map_or(std::ptr::null(), |dir| dir.as_ptr()),
            &startup,
            &mut info,
        )
    };
    let create_error = std::io::Error::last_os_error();

    if !environment.is_null() {
        // SAFETY: the block came from CreateEnvironmentBlock.
        unsafe { DestroyEnvironmentBlock(environment) };
    }
    if created == 0 {
        return Err(launch_error(program, create_error.to_string()));
    }

    // SAFETY: CreateProcessAsUserW succeeded, so both handles are ours.
    let (process, _thread) = unsafe {
        (
            OwnedHandle::from_raw_handle(info.hProcess as RawHandle),
            OwnedHandle::from_raw_handle(info.hThread as RawHandle),
        )
    };
    debug!(
        "Started {} in session {} with PID {}",
        program.display(),
        session_id,
        info.dwProcessId
    );

    Ok(SessionChild {
        process,
        pid: info.dwProcessId,
    })
}
