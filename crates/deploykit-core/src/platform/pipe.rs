//! Anonymous pipes whose child-side end can be inherited by exactly the
//! process we launch.
//!
//! # Platform Behavior
//! - **Unix**: both ends are created close-on-exec; the supervisor clears the
//!   flag on the child end inside the forked child only.
//! - **Windows**: both ends are created inheritable, then the server end is
//!   made non-inheritable with `SetHandleInformation`.

#![allow(unsafe_code)]

use crate::error::{DeployError, Result};
use std::fs::File;

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};

/// Raw value of a handle passed to a child process.
#[cfg(unix)]
pub type RawPipeHandle = RawFd;
/// Raw value of a handle passed to a child process.
#[cfg(windows)]
pub type RawPipeHandle = usize;

/// Which end of a new pipe the child receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEnd {
    /// The child reads, we write.
    Read,
    /// The child writes, we read.
    Write,
}

/// The child's end of a pipe, owned by the parent until it is released.
#[derive(Debug)]
pub struct ChildPipeEnd {
    #[cfg(unix)]
    handle: OwnedFd,
    #[cfg(windows)]
    handle: OwnedHandle,
}

impl ChildPipeEnd {
    /// Raw handle value, used to mark the handle for inheritance.
    pub fn raw(&self) -> RawPipeHandle {
        #[cfg(unix)]
        {
            self.handle.as_raw_fd()
        }
        #[cfg(windows)]
        {
            self.handle.as_raw_handle() as usize
        }
    }

    /// Handle value rendered for the child's command line.
    pub fn to_arg(&self) -> String {
        self.raw().to_string()
    }

    /// Take the end as a file, for using it in-process.
    pub fn into_file(self) -> File {
        File::from(self.handle)
    }
}

/// Create a pipe and return the parent's end as a `File` plus the child's end.
pub fn anonymous_pipe(child_end: ChildEnd) -> Result<(File, ChildPipeEnd)> {
    #[cfg(unix)]
    {
        let (read, write) = cloexec_pipe()?;
        let (server, child) = match child_end {
            ChildEnd::Read => (write, read),
            ChildEnd::Write => (read, write),
        };
        Ok((File::from(server), ChildPipeEnd { handle: child }))
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{SetHandleInformation, HANDLE, HANDLE_FLAG_INHERIT};
        use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
        use windows_sys::Win32::System::Pipes::CreatePipe;

        let attributes = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: std::ptr::null_mut(),
            bInheritHandle: 1,
        };
        let mut read: HANDLE = std::ptr::null_mut();
        let mut write: HANDLE = std::ptr::null_mut();

        // SAFETY: out pointers are valid locals; attributes outlives the call.
        if unsafe { CreatePipe(&mut read, &mut write, &attributes, 0) } == 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        // SAFETY: CreatePipe succeeded, so both handles are open and owned by us.
        let (read, write) = unsafe {
            (
                OwnedHandle::from_raw_handle(read as RawHandle),
                OwnedHandle::from_raw_handle(write as RawHandle),
            )
        };
        let (server, child) = match child_end {
            ChildEnd::Read => (write, read),
            ChildEnd::Write => (read, write),
        };

        // SAFETY: `server` is an open handle owned by this function.
        if unsafe { SetHandleInformation(server.as_raw_handle() as HANDLE, HANDLE_FLAG_INHERIT, 0) }
            == 0
        {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok((File::from(server), ChildPipeEnd { handle: child }))
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = child_end;
        Err(DeployError::Other(
            "Anonymous pipes not implemented for this platform".into(),
        ))
    }
}

/// Open a pipe end inherited from the parent, given its command-line value.
pub fn open_inherited(arg: &str) -> Result<File> {
    let invalid = |message: &str| DeployError::validation("pipe handle", format!("{arg:?}: {message}"));

    #[cfg(unix)]
    {
        let fd: RawFd = arg.trim().parse().map_err(|_| invalid("not a descriptor number"))?;
        if fd < 0 {
            return Err(invalid("negative descriptor"));
        }
        // SAFETY: F_GETFD only inspects the descriptor table entry.
        if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
            return Err(invalid("descriptor is not open"));
        }
        // SAFETY: the descriptor is open and was handed to this process for
        // its exclusive use; nothing else in the process owns it.
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{GetHandleInformation, HANDLE};

        let value: usize = arg.trim().parse().map_err(|_| invalid("not a handle value"))?;
        let mut flags = 0u32;
        // SAFETY: GetHandleInformation only validates the handle and writes flags.
        if unsafe { GetHandleInformation(value as HANDLE, &mut flags) } == 0 {
            return Err(invalid("handle is not open"));
        }
        // SAFETY: the handle was inherited for this process's exclusive use.
        Ok(File::from(unsafe { OwnedHandle::from_raw_handle(value as RawHandle) }))
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(invalid("pipes not supported on this platform"))
    }
}

#[cfg(all(unix, not(target_vendor = "apple")))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;

    nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| std::io::Error::from(e).into())
}

#[cfg(all(unix, target_vendor = "apple"))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe().map_err(std::io::Error::from)?;
    for fd in [&read, &write] {
        // SAFETY: the descriptor is open and owned by this function.
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok((read, write))
}

/// Clear close-on-exec on an inherited descriptor. Runs in the forked child,
/// so it must stay async-signal-safe.
#[cfg(unix)]
pub(crate) fn clear_cloexec(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: fcntl is async-signal-safe and only touches the fd flags.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, 0) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};

    #[test]
    fn test_pipe_carries_bytes() {
        let (mut server, child) = anonymous_pipe(ChildEnd::Read).unwrap();
        let reader = open_inherited(&child.to_arg()).unwrap();
        // The reader now owns the descriptor.
        std::mem::forget(child);

        server.write_all(b"Open\n").unwrap();
        drop(server);

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).unwrap();
        assert_eq!(line, "Open\n");
    }

    #[test]
    fn test_open_inherited_rejects_garbage() {
        assert!(matches!(
            open_inherited("not-a-handle"),
            Err(DeployError::Validation { .. })
        ));
        assert!(open_inherited("-3").is_err());
    }

    #[test]
    fn test_server_end_is_close_on_exec() {
        let (server, child) = anonymous_pipe(ChildEnd::Write).unwrap();
        let flags = unsafe { libc::fcntl(server.as_raw_fd(), libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
        let flags = unsafe { libc::fcntl(child.raw(), libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }
}
