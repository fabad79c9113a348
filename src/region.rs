//! A live mapping of a persistent-memory resource
use crate::{
    Result,
    prot::{ProtectionSet, SharingMode},
};
use core::{ffi::c_void, fmt::Debug, mem::ManuallyDrop, ptr::NonNull};

type UnmapFn = unsafe fn(NonNull<c_void>, usize) -> Result<()>;

/// An owned, live memory mapping.
///
/// The operating system enforces exactly the granted protection for the
/// region's whole lifetime: any access outside it faults. The mapping is torn
/// down exactly once, either by [`MappedRegion::unmap`], which consumes the
/// region, or when the region is dropped.
pub struct MappedRegion {
    memory: NonNull<c_void>,
    len: usize,
    protection: ProtectionSet,
    sharing: SharingMode,
    unmap: UnmapFn,
}

// A region has exactly one owner and no interior state besides the mapping.
unsafe impl Send for MappedRegion {}

impl Debug for MappedRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("memory", &self.memory)
            .field("len", &self.len)
            .field("protection", &self.protection)
            .field("sharing", &self.sharing)
            .finish()
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let res = unsafe { (self.unmap)(self.memory, self.len) };
        #[cfg(feature = "log")]
        if let Err(err) = &res {
            log::error!("Failed to tear down mapping at {:p}: {}", self.memory, err);
        }
        debug_assert!(res.is_ok(), "teardown of {:p} failed: {:?}", self.memory, res.err());
    }
}

impl MappedRegion {
    /// Takes ownership of a live mapping.
    ///
    /// # Safety
    /// `memory` and `len` must describe a mapping created with exactly
    /// `protection` and `sharing`, which `unmap` releases, and which nothing
    /// else will release.
    pub unsafe fn new(
        memory: NonNull<c_void>,
        len: usize,
        protection: ProtectionSet,
        sharing: SharingMode,
        unmap: UnmapFn,
    ) -> Self {
        MappedRegion {
            memory,
            len,
            protection,
            sharing,
            unmap,
        }
    }

    /// Tears the mapping down now and reports any failure.
    pub fn unmap(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        #[cfg(feature = "log")]
        log::trace!("Unmapping {:p} len: {:#x}", this.memory, this.len);
        unsafe { (this.unmap)(this.memory, this.len) }
    }

    /// Base address of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.memory.as_ptr().cast()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.memory.as_ptr().cast()
    }

    /// Length of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The protection the operating system enforces on this region.
    #[inline]
    pub fn protection(&self) -> ProtectionSet {
        self.protection
    }

    #[inline]
    pub fn sharing(&self) -> SharingMode {
        self.sharing
    }

    /// Views the region as bytes, if it was granted `READ`.
    ///
    /// # Safety
    /// For a shared mapping the bytes may change underneath the slice through
    /// other mappings of the same resource or other processes.
    #[inline]
    pub unsafe fn as_slice(&self) -> Option<&[u8]> {
        self.protection
            .contains(ProtectionSet::READ)
            .then(|| unsafe { core::slice::from_raw_parts(self.as_ptr(), self.len) })
    }

    /// Views the region as mutable bytes, if it was granted `READ | WRITE`.
    ///
    /// # Safety
    /// Same as [`MappedRegion::as_slice`].
    #[inline]
    pub unsafe fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.protection.contains(ProtectionSet::READ_WRITE) {
            return None;
        }
        Some(unsafe { core::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) })
    }
}
