//! Process supervision and running-process monitoring.
//!
//! - [`ProcessSupervisor`] launches a child (optionally as another account)
//!   and terminates it when its cancellation token fires.
//! - [`RunningProcessService`] polls the process table for applications
//!   matching a set of [`ProcessDefinition`]s and reports which ones must be
//!   closed.
//!
//! # Matching
//!
//! A definition is either a bare name (`"winword"`, matched against the
//! process name ignoring case) or an absolute path (matched against the
//! resolved image path ignoring case). Every poll builds its results from
//! scratch; no process handle outlives the poll that opened it.
//!
//! # Example
//!
//! ```rust,no_run
//! use deploykit_core::process::{ProcessDefinition, RunningProcessService};
//! use deploykit_core::CallerContext;
//!
//! fn main() -> deploykit_core::Result<()> {
//!     let definitions = vec![
//!         ProcessDefinition::new("winword")?.with_description("Microsoft Word")?,
//!         ProcessDefinition::new("excel")?,
//!     ];
//!     let service = RunningProcessService::with_default_interval(
//!         definitions,
//!         CallerContext::current(),
//!     )?;
//!
//!     service.on_processes_to_close_changed(|event| {
//!         for app in event.processes_to_close.iter() {
//!             println!("Still running: {}", app.description);
//!         }
//!     });
//!     service.start()?;
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     service.stop()?;
//!     Ok(())
//! }
//! ```

pub mod command_line;
mod definition;
pub(crate) mod introspect;
mod matcher;
mod service;
mod supervisor;

pub use definition::{group_by_description, ProcessDefinition, ProcessFilter, ProcessToClose, RunningProcess};
pub use introspect::{
    ProcessEntry, ProcessIntrospector, ProcessSource, RawCommandLine, SystemProcessSource,
};
pub use matcher::find_running_processes;
pub use service::{ProcessesToCloseChanged, RunningProcessService};
pub use supervisor::{LaunchRequest, ProcessExit, ProcessSupervisor, RunAsAccount, SupervisedProcess};
