//! Translation of native device paths (`\Device\HarddiskVolume3\...`) to
//! drive-letter paths.

#![allow(unsafe_code)]

use crate::error::{DeployError, Result};
use std::collections::HashMap;

const DEVICE_PREFIX: &str = "\\Device\\";
const UNC_DEVICE: &str = "\\Device\\Mup";

/// Device-name to drive-letter lookup table.
///
/// Built once per poll cycle so drives mounted in the meantime are seen on
/// the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtPathTable {
    devices: HashMap<String, String>,
}

impl Default for NtPathTable {
    fn default() -> Self {
        let mut devices = HashMap::new();
        devices.insert(UNC_DEVICE.to_ascii_lowercase(), "\\".to_string());
        Self { devices }
    }
}

impl NtPathTable {
    /// Query the OS for every mapped drive letter.
    pub fn query() -> Self {
        #[cfg_attr(not(windows), allow(unused_mut))]
        let mut table = Self::default();

        #[cfg(windows)]
        for letter in b'A'..=b'Z' {
            let drive = format!("{}:", letter as char);
            for device in query_dos_device(&drive) {
                table.insert(&device, &drive);
            }
        }

        table
    }

    /// Map a device name to a drive root, e.g. `\Device\HarddiskVolume3` to `C:`.
    pub fn insert(&mut self, device: &str, drive: &str) {
        self.devices
            .insert(device.trim_end_matches('\\').to_ascii_lowercase(), drive.to_string());
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are known.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Translate a native path.
    ///
    /// Paths that are not native device paths are returned unchanged, minus a
    /// `\??\` prefix. A device path whose device is unknown is an error.
    pub fn translate(&self, path: &str) -> Result<String> {
        if let Some(rest) = path.strip_prefix("\\??\\") {
            return Ok(rest.to_string());
        }
        let Some(after_prefix) = strip_prefix_ignore_case(path, DEVICE_PREFIX) else {
            return Ok(path.to_string());
        };

        let device_len = DEVICE_PREFIX.len()
            + after_prefix.find('\\').unwrap_or(after_prefix.len());
        let (device, remainder) = path.split_at(device_len);

        match self.devices.get(&device.to_ascii_lowercase()) {
            Some(drive) => Ok(format!("{}{}", drive, remainder)),
            None => Err(DeployError::validation(
                "image path",
                format!("no drive letter is mapped to device {device}"),
            )),
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

#[cfg(windows)]
fn query_dos_device(drive: &str) -> Vec<String> {
    use windows_sys::Win32::Storage::FileSystem::QueryDosDeviceW;

    let name: Vec<u16> = drive.encode_utf16().chain(Some(0)).collect();
    let mut buffer = vec![0u16; 1024];
    // SAFETY: `name` is NUL-terminated; buffer is writable for its length.
    let written = unsafe { QueryDosDeviceW(name.as_ptr(), buffer.as_mut_ptr(), buffer.len() as u32) };
    if written == 0 {
        return Vec::new();
    }

    // The result is a list of NUL-terminated strings ending in an empty one.
    buffer[..written as usize]
        .split(|&unit| unit == 0)
        .filter(|target| !target.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NtPathTable {
        let mut table = NtPathTable::default();
        table.insert("\\Device\\HarddiskVolume3", "C:");
        table.insert("\\Device\\HarddiskVolume10", "D:");
        table
    }

    #[test]
    fn test_translates_volume_paths() {
        let table = table();
        assert_eq!(
            table
                .translate("\\Device\\HarddiskVolume3\\Windows\\notepad.exe")
                .unwrap(),
            "C:\\Windows\\notepad.exe"
        );
        assert_eq!(
            table.translate("\\device\\harddiskvolume10\\Tools\\a.exe").unwrap(),
            "D:\\Tools\\a.exe"
        );
    }

    #[test]
    fn test_volume_prefix_does_not_match_longer_device() {
        let mut table = NtPathTable::default();
        table.insert("\\Device\\HarddiskVolume1", "C:");
        assert!(table
            .translate("\\Device\\HarddiskVolume10\\x.exe")
            .is_err());
    }

    #[test]
    fn test_unc_paths_are_seeded() {
        assert_eq!(
            NtPathTable::default()
                .translate("\\Device\\Mup\\server\\share\\app.exe")
                .unwrap(),
            "\\\\server\\share\\app.exe"
        );
    }

    #[test]
    fn test_non_device_paths_pass_through() {
        let table = table();
        assert_eq!(table.translate("C:\\x.exe").unwrap(), "C:\\x.exe");
        assert_eq!(table.translate("/usr/bin/vim").unwrap(), "/usr/bin/vim");
        assert_eq!(table.translate("\\??\\C:\\x.exe").unwrap(), "C:\\x.exe");
    }

    #[test]
    fn test_unknown_device_is_an_error() {
        let err = table()
            .translate("\\Device\\CdRom0\\setup.exe")
            .unwrap_err();
        assert!(matches!(err, DeployError::Validation { .. }));
    }

    #[test]
    fn test_query_always_has_unc_entry() {
        let table = NtPathTable::query();
        assert!(!table.is_empty());
    }
}
