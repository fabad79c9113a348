//! Opened persistent-memory resources
//!
//! A [`ResourceHandle`] owns the descriptor of a file or device-DAX character
//! device. Its access mode and backing kind are derived once, when the
//! resource is opened, and never change afterwards.
use crate::{Result, os::RawResource};
use alloc::string::{String, ToString};
use core::fmt::{Debug, Display};

/// Intrinsic capability of an opened resource.
///
/// The variants are ordered: a mode compares greater than every mode whose
/// capabilities it includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceMode {
    ReadOnly,
    ReadWrite,
    ReadWriteExec,
}

impl Display for ResourceMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResourceMode::ReadOnly => f.write_str("r"),
            ResourceMode::ReadWrite => f.write_str("rw"),
            ResourceMode::ReadWriteExec => f.write_str("rwx"),
        }
    }
}

/// Storage medium behind a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackingKind {
    /// A regular file on a (DAX-capable) filesystem.
    RegularFileBacked,
    /// A device-DAX character device. The whole device is one protection domain.
    DeviceDaxBacked,
}

/// Snapshot of everything the validator needs to know about a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub mode: ResourceMode,
    pub backing: BackingKind,
    /// Size of the resource in bytes.
    pub size: usize,
    /// Granularity that mapping offsets (and, for device-DAX, lengths) must respect.
    pub alignment: usize,
}

/// An opened file or device-DAX device.
///
/// Dropping the handle closes the underlying descriptor. Mappings created from
/// it stay valid on their own.
pub struct ResourceHandle {
    raw: RawResource,
    name: String,
    info: ResourceInfo,
}

impl Debug for ResourceHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.name)
            .field("mode", &self.info.mode)
            .field("backing", &self.info.backing)
            .field("size", &self.info.size)
            .finish()
    }
}

impl ResourceHandle {
    /// Opens `path` with exactly the requested access mode.
    ///
    /// If the platform cannot grant `mode` (for instance execute capability on
    /// a `noexec` filesystem) the open fails instead of downgrading.
    pub fn open(path: &str, mode: ResourceMode) -> Result<Self> {
        let raw = RawResource::open(path, mode)?;
        let info = raw.classify(mode)?;
        #[cfg(feature = "log")]
        log::debug!(
            "Opened [{}] mode: {} backing: {:?} size: {:#x} alignment: {:#x}",
            path,
            info.mode,
            info.backing,
            info.size,
            info.alignment
        );
        Ok(Self {
            raw,
            name: path.to_string(),
            info,
        })
    }

    /// Takes ownership of an already opened descriptor.
    ///
    /// The mode is read back from the descriptor's access flags, so it is
    /// never wider than what the descriptor actually permits. Descriptors
    /// adopted this way are never considered execute-capable.
    ///
    /// # Safety
    /// `fd` must be a valid, open descriptor that nothing else will close.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: i32, name: &str) -> Result<Self> {
        let raw = unsafe { RawResource::from_raw_fd(fd) };
        let mode = raw.access_mode()?;
        let info = raw.classify(mode)?;
        Ok(Self {
            raw,
            name: name.to_string(),
            info,
        })
    }

    /// The mode the resource was actually opened with.
    #[inline]
    pub fn mode(&self) -> ResourceMode {
        self.info.mode
    }

    #[inline]
    pub fn backing(&self) -> BackingKind {
        self.info.backing
    }

    /// Size of the resource in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.info.size
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.info.alignment
    }

    #[inline]
    pub fn info(&self) -> ResourceInfo {
        self.info
    }

    /// The path or name the resource was opened under.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file descriptor (Unix) or file handle (Windows).
    #[inline]
    pub fn as_raw(&self) -> isize {
        self.raw.as_raw()
    }
}
