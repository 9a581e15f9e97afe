//! Identity of the deployment process that drives the display server and the
//! process monitor.

use crate::platform;
use serde::{Deserialize, Serialize};

/// Who is calling: computed once and passed to the components that make
/// identity-dependent decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_name: String,
    pub session_id: u32,
    pub is_admin: bool,
}

impl CallerContext {
    /// Describe the current process.
    pub fn current() -> Self {
        Self {
            user_name: platform::current_user_name(),
            session_id: platform::current_session_id(),
            is_admin: platform::is_elevated(),
        }
    }

    /// Build an explicit context, mainly for tests and services acting on
    /// behalf of another user.
    pub fn new(user_name: impl Into<String>, session_id: u32, is_admin: bool) -> Self {
        Self {
            user_name: user_name.into(),
            session_id,
            is_admin,
        }
    }

    /// Whether `user_name` refers to the caller (case-insensitive, ignoring
    /// any `DOMAIN\` prefix).
    pub fn is_same_user(&self, user_name: &str) -> bool {
        fn bare(name: &str) -> &str {
            name.rsplit('\\').next().unwrap_or(name)
        }
        bare(&self.user_name).eq_ignore_ascii_case(bare(user_name))
    }
}
