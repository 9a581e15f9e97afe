//! Running-process monitoring through the public API, over a scripted
//! process table.

use deploykit_core::platform::NtPathTable;
use deploykit_core::process::{
    ProcessDefinition, ProcessEntry, ProcessSource, RawCommandLine, RunningProcessService,
};
use deploykit_core::{CallerContext, DeployError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Table {
    processes: Mutex<Vec<(u32, &'static str, &'static str)>>,
    descriptions: HashMap<PathBuf, &'static str>,
}

impl Table {
    fn with(processes: Vec<(u32, &'static str, &'static str)>) -> Self {
        Self {
            processes: Mutex::new(processes),
            ..Self::default()
        }
    }

    fn find(&self, pid: u32) -> Option<(u32, &'static str, &'static str)> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .copied()
            .find(|(p, _, _)| *p == pid)
    }
}

impl ProcessSource for Table {
    fn processes(&self) -> Vec<ProcessEntry> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .map(|(pid, name, _)| ProcessEntry {
                pid: *pid,
                name: name.to_string(),
            })
            .collect()
    }

    fn has_exited(&self, pid: u32) -> bool {
        self.find(pid).is_none()
    }

    fn image_path(&self, pid: u32) -> Result<String> {
        self.find(pid)
            .map(|(_, _, image)| image.to_string())
            .ok_or(DeployError::ProcessVanished { pid })
    }

    fn command_line(&self, pid: u32) -> Result<RawCommandLine> {
        // Every process here hides its command line.
        Err(DeployError::AccessDenied { pid })
    }

    fn file_description(&self, path: &Path) -> Option<String> {
        self.descriptions.get(path).map(|d| d.to_string())
    }

    fn owner(&self, _pid: u32) -> Option<String> {
        None
    }

    fn nt_path_table(&self) -> NtPathTable {
        NtPathTable::default()
    }
}

fn caller() -> CallerContext {
    CallerContext::new("deployer", 1, false)
}

#[test]
fn test_notepad_scenario() {
    let mut table = Table::with(vec![(100, "notepad", "C:\\Windows\\notepad.exe")]);
    table
        .descriptions
        .insert(PathBuf::from("C:\\Windows\\notepad.exe"), "Notepad");

    let service = RunningProcessService::with_source(
        vec![ProcessDefinition::new("notepad").unwrap()],
        Duration::from_millis(50),
        caller(),
        Arc::new(table),
    )
    .unwrap();

    let to_close = service.processes_to_close();
    assert_eq!(to_close.len(), 1);
    assert_eq!(to_close[0].name, "notepad");
    assert_eq!(to_close[0].description, "Notepad");
    assert_eq!(to_close[0].path, PathBuf::from("C:\\Windows\\notepad.exe"));
}

#[test]
fn test_same_description_is_listed_once() {
    let mut table = Table::with(vec![
        (1, "app", "C:\\App\\app.exe"),
        (2, "app", "C:\\App\\app.exe"),
    ]);
    table.descriptions.insert(PathBuf::from("C:\\App\\app.exe"), "App");

    let service = RunningProcessService::with_source(
        vec![ProcessDefinition::new("app").unwrap()],
        Duration::from_millis(50),
        caller(),
        Arc::new(table),
    )
    .unwrap();

    assert_eq!(service.running_processes().len(), 2);
    let to_close = service.processes_to_close();
    assert_eq!(to_close.len(), 1);
    assert_eq!(to_close[0].description, "App");
}

#[test]
fn test_stop_without_start_is_invalid() {
    let service = RunningProcessService::with_source(
        vec![ProcessDefinition::new("notepad").unwrap()],
        Duration::from_millis(50),
        caller(),
        Arc::new(Table::default()),
    )
    .unwrap();
    assert!(matches!(service.stop(), Err(DeployError::InvalidState { .. })));
}

#[test]
fn test_unchanged_table_fires_once() {
    let table = Table::with(vec![
        (7, "teams", "C:\\Teams\\teams.exe"),
        (8, "outlook", "C:\\Office\\outlook.exe"),
    ]);
    let service = RunningProcessService::with_source(
        vec![
            ProcessDefinition::new("teams").unwrap(),
            ProcessDefinition::new("outlook").unwrap(),
        ],
        Duration::from_millis(10),
        caller(),
        Arc::new(table),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    service.on_processes_to_close_changed(move |event| {
        let descriptions: Vec<String> = event
            .processes_to_close
            .iter()
            .map(|p| p.description.clone())
            .collect();
        let _ = tx.lock().unwrap().send(descriptions);
    });

    service.start().unwrap();
    // No file metadata: descriptions fall back to the process name, sorted.
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        ["outlook", "teams"]
    );
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    service.stop().unwrap();
}
