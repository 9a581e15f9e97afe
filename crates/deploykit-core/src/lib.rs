//! DeployKit Core - out-of-process dialog display and running-process
//! monitoring for application deployment.
//!
//! The deployment process shows dialogs through a [`DisplayServer`], which
//! launches the companion `deploykit-display` executable and drives it over a
//! pair of anonymous pipes. A [`RunningProcessService`] tracks which
//! applications must be closed before installation can proceed.
//!
//! # Example
//!
//! ```rust,no_run
//! use deploykit_core::config::DisplayServerConfig;
//! use deploykit_core::display::{DialogBoxButtons, DialogBoxDefaultButton, DialogBoxOptions};
//! use deploykit_core::{CallerContext, DisplayServer};
//!
//! fn main() -> deploykit_core::Result<()> {
//!     let config = DisplayServerConfig::beside_current_exe()?;
//!     let mut server = DisplayServer::new(CallerContext::current(), config)?;
//!     server.open()?;
//!
//!     let options = DialogBoxOptions::new("Contoso Suite", "Install now?")?
//!         .with_buttons(DialogBoxButtons::YesNo, DialogBoxDefaultButton::First)?;
//!     let answer = server.show_dialog_box(options)?;
//!     println!("User chose {answer:?}");
//!
//!
//!     // Closes the client and waits for it to exit.
//!     server.dispose();
//!     Ok(())
//! }
//! ```

pub mod caller;
pub mod cancel;
pub mod config;
pub mod display;
pub mod error;
pub mod platform;
pub mod process;

// Re-export commonly used types
pub use caller::CallerContext;
pub use cancel::{CancellationToken, CancelledError};
pub use config::{DisplayServerConfig, ProcessMonitorConfig};
pub use display::{DisplayClient, DisplayServer, HeadlessRenderer};
pub use error::{DeployError, Result};
pub use process::{
    ProcessDefinition, ProcessSupervisor, ProcessToClose, RunningProcess, RunningProcessService,
};
