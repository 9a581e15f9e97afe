//! Platform-specific process queries.
//!
//! Liveness checks for any platform plus the Windows queries the process
//! introspector needs: the native image path and the raw command line of
//! another process.

#![allow(unsafe_code)]

#[cfg(windows)]
use crate::error::{DeployError, Result};
#[cfg(not(any(unix, windows)))]
use tracing::warn;

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `kill(pid, 0)`; `EPERM` still means the process
///   exists, it just belongs to someone else
/// - **Windows**: Opens the process and checks for `STILL_ACTIVE`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::STILL_ACTIVE;
        use windows_sys::Win32::System::Threading::GetExitCodeProcess;

        let Ok(handle) = open_for_query(pid) else {
            return false;
        };
        let mut code = 0u32;
        // SAFETY: handle is open for query access; `code` is a valid out pointer.
        let ok = unsafe { GetExitCodeProcess(raw(&handle), &mut code) };
        ok != 0 && code == STILL_ACTIVE as u32
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::ffi::c_void;
    use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
    use windows_sys::Win32::Foundation::{
        GetLastError, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE, UNICODE_STRING,
    };
    use windows_sys::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_NATIVE,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };

    const PROCESS_COMMAND_LINE_INFORMATION: u32 = 60;
    const STATUS_INFO_LENGTH_MISMATCH: i32 = 0xC000_0004_u32 as i32;
    const STATUS_BUFFER_TOO_SMALL: i32 = 0xC000_0023_u32 as i32;
    const STATUS_ACCESS_DENIED: i32 = 0xC000_0022_u32 as i32;

    #[link(name = "ntdll")]
    extern "system" {
        fn NtQueryInformationProcess(
            process: HANDLE,
            class: u32,
            info: *mut c_void,
            info_len: u32,
            return_len: *mut u32,
        ) -> i32;
    }

    pub(super) fn raw(handle: &OwnedHandle) -> HANDLE {
        handle.as_raw_handle() as HANDLE
    }

    /// Open a process for limited query access.
    pub fn open_for_query(pid: u32) -> Result<OwnedHandle> {
        // SAFETY: OpenProcess has no pointer arguments.
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if handle.is_null() {
            // SAFETY: reads the calling thread's last-error value.
            return Err(match unsafe { GetLastError() } {
                ERROR_ACCESS_DENIED => DeployError::AccessDenied { pid },
                ERROR_INVALID_PARAMETER => DeployError::ProcessVanished { pid },
                code => DeployError::Introspection {
                    pid,
                    message: format!("OpenProcess failed with error {code}"),
                },
            });
        }
        // SAFETY: OpenProcess returned a fresh handle we now own.
        Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
    }

    /// Native (`\Device\HarddiskVolumeN\...`) image path of a process.
    pub fn query_native_image_path(pid: u32) -> Result<String> {
        let handle = open_for_query(pid)?;
        let mut buffer = vec![0u16; 32_768];
        let mut len = buffer.len() as u32;

        // SAFETY: buffer holds `len` UTF-16 units; `len` is a valid in/out pointer.
        let ok = unsafe {
            QueryFullProcessImageNameW(raw(&handle), PROCESS_NAME_NATIVE, buffer.as_mut_ptr(), &mut len)
        };
        if ok == 0 {
            // SAFETY: reads the calling thread's last-error value.
            return Err(match unsafe { GetLastError() } {
                ERROR_ACCESS_DENIED => DeployError::AccessDenied { pid },
                ERROR_INVALID_PARAMETER => DeployError::ProcessVanished { pid },
                code => DeployError::Introspection {
                    pid,
                    message: format!("QueryFullProcessImageNameW failed with error {code}"),
                },
            });
        }
        Ok(String::from_utf16_lossy(&buffer[..len as usize]))
    }

    /// Raw command line of a process, as the process itself sees it.
    pub fn query_command_line(pid: u32) -> Result<String> {
        let handle = open_for_query(pid)?;
        // u64 backing keeps the UNICODE_STRING header aligned.
        let mut buffer = vec![0u64; 512];

        loop {
            let byte_len = (buffer.len() * std::mem::size_of::<u64>()) as u32;
            let mut needed = 0u32;
            // SAFETY: buffer is writable for `byte_len` bytes; `needed` is a valid out pointer.
            let status = unsafe {
                NtQueryInformationProcess(
                    raw(&handle),
                    PROCESS_COMMAND_LINE_INFORMATION,
                    buffer.as_mut_ptr().cast(),
                    byte_len,
                    &mut needed,
                )
            };

            match status {
                0 => break,
                STATUS_INFO_LENGTH_MISMATCH | STATUS_BUFFER_TOO_SMALL if needed > byte_len => {
                    buffer.resize((needed as usize).div_ceil(8), 0);
                }
                STATUS_ACCESS_DENIED => return Err(DeployError::AccessDenied { pid }),
                status => {
                    return Err(DeployError::Introspection {
                        pid,
                        message: format!("NtQueryInformationProcess returned {status:#x}"),
                    })
                }
            }
        }

        // SAFETY: on success the buffer starts with a UNICODE_STRING whose
        // Buffer points into the same allocation.
        let text = unsafe {
            let header = &*(buffer.as_ptr() as *const UNICODE_STRING);
            if header.Buffer.is_null() || header.Length == 0 {
                return Ok(String::new());
            }
            std::slice::from_raw_parts(header.Buffer, header.Length as usize / 2)
        };
        Ok(String::from_utf16_lossy(text))
    }
}

#[cfg(windows)]
pub use windows_impl::{open_for_query, query_command_line, query_native_image_path};
#[cfg(windows)]
use windows_impl::raw;
