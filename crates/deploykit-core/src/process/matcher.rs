//! Matching process definitions against one snapshot of the process table.

use crate::caller::CallerContext;
use crate::process::definition::{ProcessDefinition, RunningProcess};
use crate::process::introspect::ProcessIntrospector;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Find every live process matching `definitions`, ordered by description.
///
/// A process that matches several definitions is reported once per
/// definition. Introspection failures never escape: the affected process is
/// skipped or degraded.
pub fn find_running_processes(
    introspector: &ProcessIntrospector<'_>,
    definitions: &[ProcessDefinition],
    caller: &CallerContext,
) -> Vec<RunningProcess> {
    let source = introspector.source();
    let wanted: Vec<String> = definitions
        .iter()
        .map(|definition| definition.bare_name().to_lowercase())
        .collect();
    let candidates: Vec<_> = source
        .processes()
        .into_iter()
        .filter(|entry| wanted.contains(&entry.name.to_lowercase()))
        .collect();

    // argv per pid for this cycle; `None` marks a process to skip.
    let mut argv_cache: HashMap<u32, Option<Vec<String>>> = HashMap::new();
    let mut matches = Vec::new();

    for definition in definitions {
        for entry in &candidates {
            if !eq_ignore_case(&entry.name, definition.bare_name()) {
                continue;
            }
            if source.has_exited(entry.pid) {
                continue;
            }

            let argv = argv_cache.entry(entry.pid).or_insert_with(|| {
                match introspector.resolve_argv(entry.pid, &entry.name) {
                    Ok(argv) => Some(argv),
                    Err(e) => {
                        debug!("Skipping process {} ({}): {}", entry.pid, entry.name, e);
                        None
                    }
                }
            });
            let Some(argv) = argv.as_ref() else {
                continue;
            };

            if definition.is_path() && !eq_ignore_case(&argv[0], definition.name()) {
                continue;
            }

            let file_name = PathBuf::from(&argv[0]);
            let description = definition
                .description()
                .map(str::to_string)
                .or_else(|| introspector.file_description(&file_name))
                .unwrap_or_else(|| entry.name.clone());

            // Reading another account's process token needs elevation.
            let username = if caller.is_admin {
                source.owner(entry.pid)
            } else {
                None
            };

            let process = RunningProcess {
                pid: entry.pid,
                process_name: entry.name.clone(),
                description,
                file_name,
                arguments: argv[1..]
                    .iter()
                    .filter(|arg| !arg.trim().is_empty())
                    .cloned()
                    .collect(),
                username,
            };

            if let Some(filter) = definition.filter() {
                if !filter(&process) {
                    trace!("Process {} rejected by filter", process.pid);
                    continue;
                }
            }
            if source.has_exited(entry.pid) {
                continue;
            }
            matches.push(process);
        }
    }

    matches.sort_by(|a, b| a.description.cmp(&b.description));
    matches
}

/// Case-insensitive comparison that also folds non-ASCII letters.
fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
