//! Version-resource metadata of executable files.

#![allow(unsafe_code)]

use std::path::Path;

/// The `FileDescription` version string of an executable, if it has one.
///
/// Only Windows images carry version resources; elsewhere this is `None`.
pub fn file_description(path: &Path) -> Option<String> {
    #[cfg(windows)]
    {
        windows_impl::file_description(path)
    }

    #[cfg(not(windows))]
    {
        let _ = path;
        None
    }
}

#[cfg(windows)]
mod windows_impl {
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use windows_sys::Win32::Storage::FileSystem::{
        GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW,
    };

    // en-US, Unicode
    const FALLBACK_TRANSLATION: &str = "040904b0";

    fn wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(Some(0)).collect()
    }

    fn query<'a>(block: &'a [u8], sub_block: &str) -> Option<&'a [u8]> {
        let name = wide(sub_block);
        let mut value: *mut c_void = std::ptr::null_mut();
        let mut len = 0u32;
        // SAFETY: block is a version-info buffer filled by GetFileVersionInfoW;
        // the returned pointer aliases into it.
        let ok = unsafe { VerQueryValueW(block.as_ptr().cast(), name.as_ptr(), &mut value, &mut len) };
        if ok == 0 || value.is_null() {
            return None;
        }
        let start = value as usize - block.as_ptr() as usize;
        block.get(start..)
            .map(|tail| &tail[..tail.len().min(len as usize * 2)])
    }

    pub fn file_description(path: &Path) -> Option<String> {
        let file: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        let mut ignored = 0u32;
        // SAFETY: `file` is NUL-terminated.
        let size = unsafe { GetFileVersionInfoSizeW(file.as_ptr(), &mut ignored) };
        if size == 0 {
            return None;
        }

        let mut block = vec![0u8; size as usize];
        // SAFETY: block is writable for `size` bytes.
        if unsafe { GetFileVersionInfoW(file.as_ptr(), 0, size, block.as_mut_ptr().cast()) } == 0 {
            return None;
        }

        let translation = query(&block, "\\VarFileInfo\\Translation")
            .filter(|bytes| bytes.len() >= 4)
            .map(|bytes| {
                let lang = u16::from_le_bytes([bytes[0], bytes[1]]);
                let code_page = u16::from_le_bytes([bytes[2], bytes[3]]);
                format!("{lang:04x}{code_page:04x}")
            })
            .unwrap_or_else(|| FALLBACK_TRANSLATION.to_string());

        let raw = query(
            &block,
            &format!("\\StringFileInfo\\{translation}\\FileDescription"),
        )?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        let description = String::from_utf16_lossy(&units).trim().to_string();
        (!description.is_empty()).then_some(description)
    }
}
