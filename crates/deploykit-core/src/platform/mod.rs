//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather
//! than being scattered through the display and process code.
//!
//! # Architecture
//!
//! - `pipe` - Anonymous pipes with child-only inheritance
//! - `process` - Liveness checks and Windows process queries
//! - `nt_path` - Native device path translation
//! - `file_info` - Version-resource metadata
//! - `identity` - User, session and elevation of the current process
//! - `session` - Launching into another user's session (Windows only)
//!
//! # Supported Platforms
//!
//! - **Windows**: Full support
//! - **Linux/macOS**: Everything except version resources and session launch

pub mod file_info;
pub mod identity;
pub mod nt_path;
pub mod pipe;
pub mod process;
#[cfg(windows)]
pub mod session;

pub use file_info::file_description;
pub use identity::{current_session_id, current_user_name, is_elevated};
pub use nt_path::NtPathTable;
pub use pipe::{anonymous_pipe, open_inherited, ChildEnd, ChildPipeEnd, RawPipeHandle};
pub use process::is_process_alive;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform() {
        let platform = current_platform();
        assert!(["linux", "windows", "macos", "unknown"].contains(&platform));
    }
}
