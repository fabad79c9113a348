use crate::validate::DenyReason;
use alloc::borrow::Cow;
use core::fmt::Display;

/// Native error code reported by the operating system (`errno` on Unix,
/// `GetLastError` on Windows).
pub type RawOsError = i32;

/// Error types used throughout the `pmem_map` library.
///
/// Every failure is surfaced as exactly one of these variants; nothing is
/// retried or downgraded internally.
#[derive(Debug)]
pub enum Error {
    /// The resource could not be opened or classified.
    ///
    /// This error typically indicates issues such as:
    /// * File or device not found
    /// * Permission denied for the requested open mode
    /// * Unsupported file type (directory, non-DAX character device)
    /// * Execute capability requested on a `noexec` filesystem
    Open {
        /// A descriptive message about the open failure.
        msg: Cow<'static, str>,
        /// The native error code, if the failure came from a system call.
        code: Option<RawOsError>,
    },

    /// The protection validator refused the request. No OS call was made.
    Denied {
        /// Why the request was refused.
        reason: DenyReason,
    },

    /// The request is valid in principle, but the platform's native mapping
    /// primitive has no way to express it. Raised before any OS call.
    PlatformUnsupported {
        /// A descriptive message about the unsupported combination.
        msg: Cow<'static, str>,
    },

    /// A mapping system call was attempted and rejected by the kernel or driver.
    MappingSyscall {
        /// Which call failed.
        msg: Cow<'static, str>,
        /// The native error code.
        code: RawOsError,
    },
}

impl Error {
    /// Returns the native error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<RawOsError> {
        match self {
            Error::Open { code, .. } => *code,
            Error::MappingSyscall { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the deny reason if this error is a validator denial.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Error::Denied { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Open {
                msg,
                code: Some(code),
            } => write!(f, "Open error: {msg} (os error {code})"),
            Error::Open { msg, code: None } => write!(f, "Open error: {msg}"),
            Error::Denied { reason } => write!(f, "Mapping denied: {reason}"),
            Error::PlatformUnsupported { msg } => write!(f, "Unsupported on this platform: {msg}"),
            Error::MappingSyscall { msg, code } => {
                write!(f, "Memory mapping error: {msg} (os error {code})")
            }
        }
    }
}

impl core::error::Error for Error {}

#[cold]
#[inline(never)]
pub(crate) fn open_error(msg: impl Into<Cow<'static, str>>, code: Option<RawOsError>) -> Error {
    Error::Open {
        msg: msg.into(),
        code,
    }
}

#[cold]
#[inline(never)]
pub(crate) fn denied(reason: DenyReason) -> Error {
    Error::Denied { reason }
}

#[cold]
#[inline(never)]
pub(crate) fn unsupported(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::PlatformUnsupported { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn syscall_error(msg: impl Into<Cow<'static, str>>, code: RawOsError) -> Error {
    Error::MappingSyscall {
        msg: msg.into(),
        code,
    }
}
