//! Identity of the current process: user, session and elevation.

#![allow(unsafe_code)]

/// Name of the user the current process runs as.
pub fn current_user_name() -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{geteuid, User};

        if let Ok(Some(user)) = User::from_uid(geteuid()) {
            return user.name;
        }
        std::env::var("USER").unwrap_or_default()
    }

    #[cfg(windows)]
    {
        std::env::var("USERNAME").unwrap_or_default()
    }

    #[cfg(not(any(unix, windows)))]
    {
        String::new()
    }
}

/// Login/terminal session identifier of the current process.
pub fn current_session_id() -> u32 {
    #[cfg(unix)]
    {
        nix::unistd::getsid(None)
            .map(|pid| pid.as_raw() as u32)
            .unwrap_or(0)
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::System::RemoteDesktop::ProcessIdToSessionId;
        use windows_sys::Win32::System::Threading::GetCurrentProcessId;

        let mut session_id = 0u32;
        // SAFETY: `session_id` is a valid out pointer for the duration of the call.
        let ok = unsafe { ProcessIdToSessionId(GetCurrentProcessId(), &mut session_id) };
        if ok == 0 {
            0
        } else {
            session_id
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        0
    }
}

/// Whether the current process runs with administrative rights.
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(windows)]
    {
        // SAFETY: IsUserAnAdmin takes no arguments and only reads the process token.
        unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() != 0 }
    }

    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_is_resolved() {
        // CI containers may have no passwd entry, so only require no panic
        // and a stable answer.
        assert_eq!(current_user_name(), current_user_name());
    }

    #[test]
    fn test_session_id_is_stable() {
        assert_eq!(current_session_id(), current_session_id());
    }
}
