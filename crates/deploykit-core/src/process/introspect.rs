//! Per-process introspection: image path, argument vector, file metadata.
//!
//! The OS queries sit behind the [`ProcessSource`] trait so the matching
//! logic can be driven by a scripted process table in tests. The
//! [`ProcessIntrospector`] layers path translation, command-line parsing and
//! the access-denied fallback on top of a source.

use crate::error::{DeployError, Result};
use crate::platform::{self, NtPathTable};
use crate::process::command_line::command_line_to_argv;
use crate::process::definition::strip_exe_suffix;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
use tracing::debug;

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Bare process name, without extension.
    pub name: String,
}

/// A command line as the OS reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCommandLine {
    /// A single string that still has to be split (Windows).
    Text(String),
    /// An already split argument vector (Unix).
    Argv(Vec<String>),
}

/// OS capabilities the process monitor relies on.
pub trait ProcessSource: Send + Sync {
    /// Snapshot the process table.
    fn processes(&self) -> Vec<ProcessEntry>;

    /// Whether the process has exited since the snapshot.
    fn has_exited(&self, pid: u32) -> bool;

    /// Image path as reported by the OS, possibly a native device path.
    fn image_path(&self, pid: u32) -> Result<String>;

    /// Command line of the process.
    fn command_line(&self, pid: u32) -> Result<RawCommandLine>;

    /// Human-readable description embedded in an executable.
    fn file_description(&self, path: &Path) -> Option<String>;

    /// Account the process runs as.
    fn owner(&self, pid: u32) -> Option<String>;

    /// Device-to-drive table used to translate native image paths.
    fn nt_path_table(&self) -> NtPathTable {
        NtPathTable::query()
    }
}

/// [`ProcessSource`] backed by `sysinfo` and the platform queries.
pub struct SystemProcessSource {
    system: Mutex<System>,
    users: Mutex<Users>,
}

impl SystemProcessSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            users: Mutex::new(Users::new_with_refreshed_list()),
        }
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.process(Pid::from_u32(pid)).map(f)
    }

    #[cfg_attr(windows, allow(dead_code))]
    fn unavailable(&self, pid: u32) -> DeployError {
        if platform::is_process_alive(pid) {
            DeployError::AccessDenied { pid }
        } else {
            DeployError::ProcessVanished { pid }
        }
    }
}

impl Default for SystemProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SystemProcessSource {
    fn processes(&self) -> Vec<ProcessEntry> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let refresh_kind = ProcessRefreshKind::new()
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_user(UpdateKind::OnlyIfNotSet);
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind);
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_list();

        system
            .processes()
            .iter()
            .map(|(pid, process)| {
                // `name()` is truncated on Linux; the image stem is not.
                let name = process
                    .exe()
                    .and_then(Path::file_stem)
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| {
                        strip_exe_suffix(&process.name().to_string_lossy()).to_string()
                    });
                ProcessEntry {
                    pid: pid.as_u32(),
                    name,
                }
            })
            .collect()
    }

    fn has_exited(&self, pid: u32) -> bool {
        !platform::is_process_alive(pid)
    }

    fn image_path(&self, pid: u32) -> Result<String> {
        #[cfg(windows)]
        {
            platform::process::query_native_image_path(pid)
        }

        #[cfg(not(windows))]
        {
            let path = self.with_process(pid, |process| {
                process
                    .exe()
                    .map(|exe| exe.display().to_string())
                    .or_else(|| {
                        process
                            .cmd()
                            .first()
                            .map(|arg| arg.to_string_lossy().into_owned())
                            .filter(|arg| arg.starts_with('/'))
                    })
            });
            path.flatten().ok_or_else(|| self.unavailable(pid))
        }
    }

    fn command_line(&self, pid: u32) -> Result<RawCommandLine> {
        #[cfg(windows)]
        {
            platform::process::query_command_line(pid).map(RawCommandLine::Text)
        }

        #[cfg(not(windows))]
        {
            let argv = self.with_process(pid, |process| {
                process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
            });
            match argv {
                Some(argv) if !argv.is_empty() => Ok(RawCommandLine::Argv(argv)),
                _ => Err(self.unavailable(pid)),
            }
        }
    }

    fn file_description(&self, path: &Path) -> Option<String> {
        platform::file_description(path)
    }

    fn owner(&self, pid: u32) -> Option<String> {
        let uid = self.with_process(pid, |process| process.user_id().cloned())??;
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.get_user_by_id(&uid).map(|user| user.name().to_string())
    }
}

/// Introspection helpers bound to one poll cycle.
pub struct ProcessIntrospector<'a> {
    source: &'a dyn ProcessSource,
    nt_paths: NtPathTable,
}

impl<'a> ProcessIntrospector<'a> {
    /// Start a cycle: the device table is rebuilt once here.
    pub fn for_cycle(source: &'a dyn ProcessSource) -> Self {
        Self {
            nt_paths: source.nt_path_table(),
            source,
        }
    }

    pub fn source(&self) -> &'a dyn ProcessSource {
        self.source
    }

    /// Image path with native device prefixes translated to drive letters.
    pub fn resolve_image_path(&self, pid: u32) -> Result<PathBuf> {
        let raw = self.source.image_path(pid)?;
        let translated = self
            .nt_paths
            .translate(&raw)
            .map_err(|e| DeployError::Introspection {
                pid,
                message: e.to_string(),
            })?;
        Ok(PathBuf::from(translated))
    }

    /// Argument vector whose first element is the resolved image path.
    ///
    /// A command line that cannot be read degrades to just the image path;
    /// an image path that cannot be resolved is returned as an error so the
    /// caller can skip the process.
    pub fn resolve_argv(&self, pid: u32, process_name: &str) -> Result<Vec<String>> {
        let image = self.resolve_image_path(pid)?.display().to_string();

        let argv = match self.source.command_line(pid) {
            Ok(RawCommandLine::Text(text)) => {
                let mut argv = command_line_to_argv(&text);
                match argv.first_mut() {
                    Some(first) => *first = image,
                    None => argv.push(image),
                }
                argv
            }
            Ok(RawCommandLine::Argv(mut argv)) => {
                // Unix processes may rewrite argv[0] into a title, or drop it.
                match argv.first() {
                    None => argv.push(image),
                    Some(first) if refers_to_executable(first, process_name) => argv[0] = image,
                    Some(_) => argv.insert(0, image),
                }
                argv
            }
            Err(e) => {
                debug!("Command line of process {} unavailable: {}", pid, e);
                vec![image]
            }
        };
        Ok(argv)
    }

    pub fn file_description(&self, path: &Path) -> Option<String> {
        self.source.file_description(path)
    }
}

/// Whether argv[0] names the executable, as opposed to a rewritten process
/// title or the first real argument.
fn refers_to_executable(first: &str, process_name: &str) -> bool {
    first
        .to_lowercase()
        .contains(&process_name.to_lowercase())
        || strip_exe_suffix(first).len() != first.len()
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeProcess, FakeProcessSource};
    use super::*;

    #[test]
    fn test_native_image_path_is_translated() {
        let source = FakeProcessSource::with(vec![FakeProcess::new(
            7,
            "notepad",
            "\\Device\\HarddiskVolume3\\Windows\\notepad.exe",
            "notepad.exe C:\\notes.txt",
        )]);
        let introspector = ProcessIntrospector::for_cycle(&source);

        assert_eq!(
            introspector.resolve_image_path(7).unwrap(),
            PathBuf::from("C:\\Windows\\notepad.exe")
        );
        assert_eq!(
            introspector.resolve_argv(7, "notepad").unwrap(),
            ["C:\\Windows\\notepad.exe", "C:\\notes.txt"]
        );
    }

    #[test]
    fn test_access_denied_degrades_to_image_path() {
        let mut process = FakeProcess::new(8, "lsass", "C:\\Windows\\System32\\lsass.exe", "");
        process.command_line = None;
        let source = FakeProcessSource::with(vec![process]);

        let argv = ProcessIntrospector::for_cycle(&source)
            .resolve_argv(8, "lsass")
            .unwrap();
        assert_eq!(argv, ["C:\\Windows\\System32\\lsass.exe"]);
    }

    #[test]
    fn test_vanished_process_is_an_error() {
        let mut process = FakeProcess::new(9, "gone", "", "");
        process.image = None;
        let source = FakeProcessSource::with(vec![process]);

        let err = ProcessIntrospector::for_cycle(&source)
            .resolve_argv(9, "gone")
            .unwrap_err();
        assert!(matches!(err, DeployError::ProcessVanished { pid: 9 }));
    }

    #[test]
    fn test_argv0_is_always_replaced_by_image() {
        let source = FakeProcessSource::with(vec![FakeProcess::new(
            10,
            "foo_x64",
            "C:\\Tools\\foo_x64.exe",
            "\"C:\\Tools\\launcher\" --x",
        )]);

        let argv = ProcessIntrospector::for_cycle(&source)
            .resolve_argv(10, "foo_x64")
            .unwrap();
        assert_eq!(argv, ["C:\\Tools\\foo_x64.exe", "--x"]);
    }

    #[test]
    fn test_rewritten_unix_title_keeps_its_arguments() {
        assert!(!refers_to_executable("postgres: checkpointer", "python"));
        assert!(refers_to_executable("/usr/bin/python3", "python3"));
        assert!(refers_to_executable("C:\\x\\tool.EXE", "other"));
    }

    #[test]
    fn test_unknown_device_is_introspection_error() {
        let source = FakeProcessSource::with(vec![FakeProcess::new(
            11,
            "setup",
            "\\Device\\CdRom0\\setup.exe",
            "setup.exe",
        )]);
        let err = ProcessIntrospector::for_cycle(&source)
            .resolve_image_path(11)
            .unwrap_err();
        assert!(err.is_recoverable_introspection());
    }

    #[test]
    fn test_system_source_sees_current_process() {
        let source = SystemProcessSource::new();
        let pid = std::process::id();
        assert!(source.processes().iter().any(|entry| entry.pid == pid));
        assert!(!source.has_exited(pid));
        let introspector = ProcessIntrospector::for_cycle(&source);
        let image = introspector.resolve_image_path(pid).unwrap();
        assert_eq!(image, std::env::current_exe().unwrap());
    }
}
