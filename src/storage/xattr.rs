//! Extended attribute tagging.
//!
//! Dropbox skips any entry carrying its ignore attribute. Lookups and writes
//! follow symlinks, so tagging a link tags its target.

#![allow(unsafe_code)]

use std::path::Path;

use crate::error::AttributeError;

/// Persistent "exclude from sync" marker on a filesystem entry.
///
/// All operations are idempotent.
pub trait AttributeStore: Send + Sync {
    /// Whether the entry already carries the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute cannot be read.
    fn is_tagged(&self, path: &Path) -> Result<bool, AttributeError>;

    /// Apply the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute cannot be written.
    fn set_tagged(&self, path: &Path) -> Result<(), AttributeError>;

    /// Remove the marker. Removing an absent marker succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute cannot be removed.
    fn clear_tagged(&self, path: &Path) -> Result<(), AttributeError>;
}

/// Attribute value written when tagging.
pub const ATTRIBUTE_VALUE: &[u8] = b"1";

/// Name of the ignore attribute on this platform.
#[cfg(target_os = "macos")]
pub const ATTRIBUTE_NAME: &str = "com.apple.fileprovider.ignore#P";

/// Name of the ignore attribute on this platform.
#[cfg(not(target_os = "macos"))]
pub const ATTRIBUTE_NAME: &str = "user.com.dropbox.ignored";

/// [`AttributeStore`] backed by the OS extended attribute calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct XattrStore;

impl XattrStore {
    /// Create a store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod sys {
    use std::ffi::CStr;
    use std::io;

    #[cfg(target_os = "linux")]
    pub const NAME: &[u8] = b"user.com.dropbox.ignored\0";
    #[cfg(target_os = "macos")]
    pub const NAME: &[u8] = b"com.apple.fileprovider.ignore#P\0";

    #[cfg(target_os = "linux")]
    pub const NO_ATTRIBUTE: i32 = libc::ENODATA;
    #[cfg(target_os = "macos")]
    pub const NO_ATTRIBUTE: i32 = libc::ENOATTR;

    fn name() -> *const libc::c_char {
        NAME.as_ptr().cast()
    }

    /// Length of the attribute value.
    pub fn get(path: &CStr) -> io::Result<usize> {
        // SAFETY: both pointers are NUL-terminated; a null buffer of size 0
        // only queries the value length.
        #[cfg(target_os = "linux")]
        let n = unsafe { libc::getxattr(path.as_ptr(), name(), std::ptr::null_mut(), 0) };
        #[cfg(target_os = "macos")]
        let n = unsafe { libc::getxattr(path.as_ptr(), name(), std::ptr::null_mut(), 0, 0, 0) };

        usize::try_from(n).map_err(|_| io::Error::last_os_error())
    }

    pub fn set(path: &CStr, value: &[u8]) -> io::Result<()> {
        // SAFETY: both strings are NUL-terminated and `value` is valid for
        // `value.len()` bytes.
        #[cfg(target_os = "linux")]
        let rc = unsafe {
            libc::setxattr(path.as_ptr(), name(), value.as_ptr().cast(), value.len(), 0)
        };
        #[cfg(target_os = "macos")]
        let rc = unsafe {
            libc::setxattr(path.as_ptr(), name(), value.as_ptr().cast(), value.len(), 0, 0)
        };

        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub fn remove(path: &CStr) -> io::Result<()> {
        // SAFETY: both strings are NUL-terminated.
        #[cfg(target_os = "linux")]
        let rc = unsafe { libc::removexattr(path.as_ptr(), name()) };
        #[cfg(target_os = "macos")]
        let rc = unsafe { libc::removexattr(path.as_ptr(), name(), 0) };

        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn c_path(path: &Path) -> Result<std::ffi::CString, AttributeError> {
    use std::os::unix::ffi::OsStrExt;

    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| AttributeError::InvalidPath(path.to_path_buf()))
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn os_error(op: &'static str, path: &Path, source: std::io::Error) -> AttributeError {
    if source.kind() == std::io::ErrorKind::Unsupported {
        return AttributeError::Unsupported;
    }
    AttributeError::Os {
        op,
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl AttributeStore for XattrStore {
    fn is_tagged(&self, path: &Path) -> Result<bool, AttributeError> {
        match sys::get(&c_path(path)?) {
            Ok(_) => Ok(true),
            Err(e) if e.raw_os_error() == Some(sys::NO_ATTRIBUTE) => Ok(false),
            Err(e) => Err(os_error("getxattr", path, e)),
        }
    }

    fn set_tagged(&self, path: &Path) -> Result<(), AttributeError> {
        sys::set(&c_path(path)?, ATTRIBUTE_VALUE).map_err(|e| os_error("setxattr", path, e))
    }

    fn clear_tagged(&self, path: &Path) -> Result<(), AttributeError> {
        match sys::remove(&c_path(path)?) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(sys::NO_ATTRIBUTE) => Ok(()),
            Err(e) => Err(os_error("removexattr", path, e)),
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl AttributeStore for XattrStore {
    fn is_tagged(&self, _path: &Path) -> Result<bool, AttributeError> {
        Err(AttributeError::Unsupported)
    }

    fn set_tagged(&self, _path: &Path) -> Result<(), AttributeError> {
        Err(AttributeError::Unsupported)
    }

    fn clear_tagged(&self, _path: &Path) -> Result<(), AttributeError> {
        Err(AttributeError::Unsupported)
    }
}
