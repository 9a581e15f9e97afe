//! Process definitions and the records produced by matching them against
//! the live process table.

use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Predicate applied to every candidate match.
pub type ProcessFilter = Arc<dyn Fn(&RunningProcess) -> bool + Send + Sync>;

/// A process the deployment needs closed, by bare name or absolute path.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "DefinitionRecord")]
pub struct ProcessDefinition {
    name: String,
    description: Option<String>,
    #[serde(skip)]
    filter: Option<ProcessFilter>,
}

#[derive(Deserialize)]
struct DefinitionRecord {
    name: String,
    description: Option<String>,
}

impl TryFrom<DefinitionRecord> for ProcessDefinition {
    type Error = DeployError;

    fn try_from(record: DefinitionRecord) -> Result<Self> {
        let definition = ProcessDefinition::new(record.name)?;
        match record.description {
            Some(description) => definition.with_description(description),
            None => Ok(definition),
        }
    }
}

impl ProcessDefinition {
    /// Create a definition for a bare process name (`"winword"`) or an
    /// absolute executable path.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DeployError::validation("name", "process name cannot be blank"));
        }
        Ok(Self {
            name,
            description: None,
            filter: None,
        })
    }

    /// Set the description shown to the user.
    pub fn with_description(mut self, description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(DeployError::validation(
                "description",
                "process description cannot be blank",
            ));
        }
        self.description = Some(description);
        Ok(self)
    }

    /// Only match processes for which `filter` returns `true`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RunningProcess) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn filter(&self) -> Option<&ProcessFilter> {
        self.filter.as_ref()
    }

    /// Whether the name is an absolute path rather than a bare name.
    pub fn is_path(&self) -> bool {
        is_absolute_any(&self.name)
    }

    /// Bare name used to pre-filter the process table: the file stem for
    /// path definitions, the name itself otherwise.
    pub fn bare_name(&self) -> &str {
        if self.is_path() {
            let file = self
                .name
                .rsplit(['\\', '/'])
                .next()
                .unwrap_or(&self.name);
            strip_exe_suffix(file)
        } else {
            &self.name
        }
    }
}

impl fmt::Debug for ProcessDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl PartialEq for ProcessDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.description == other.description
    }
}

/// A live process that matched a definition during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningProcess {
    pub pid: u32,
    /// Bare process name, without extension.
    pub process_name: String,
    pub description: String,
    pub file_name: PathBuf,
    /// Arguments after the executable, blank ones dropped.
    pub arguments: Vec<String>,
    pub username: Option<String>,
}

impl RunningProcess {
    /// Arguments joined into a single command-line string.
    pub fn argument_string(&self) -> Option<String> {
        (!self.arguments.is_empty())
            .then(|| super::command_line::argv_to_command_line(&self.arguments))
    }
}

/// What the close-apps dialog shows for one group of matching processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessToClose {
    pub name: String,
    pub path: PathBuf,
    pub description: String,
}

impl From<&RunningProcess> for ProcessToClose {
    fn from(process: &RunningProcess) -> Self {
        Self {
            name: process.process_name.clone(),
            path: process.file_name.clone(),
            description: process.description.clone(),
        }
    }
}

/// Reduce matches (already ordered by description) to one entry per
/// description, keeping the first of each group.
pub fn group_by_description(processes: &[RunningProcess]) -> Vec<ProcessToClose> {
    let mut grouped: Vec<ProcessToClose> = Vec::new();
    for process in processes {
        if grouped
            .iter()
            .all(|existing| existing.description != process.description)
        {
            grouped.push(process.into());
        }
    }
    grouped
}

/// Absolute on either Windows or POSIX conventions.
pub(crate) fn is_absolute_any(name: &str) -> bool {
    let bytes = name.as_bytes();
    let drive_rooted = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    drive_rooted
        || name.starts_with("\\\\")
        || name.starts_with('/')
        || Path::new(name).is_absolute()
}

pub(crate) fn strip_exe_suffix(file: &str) -> &str {
    match file.len().checked_sub(4) {
        Some(split) if file.is_char_boundary(split) && file[split..].eq_ignore_ascii_case(".exe") => {
            &file[..split]
        }
        _ => file,
    }
}
