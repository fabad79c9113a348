use core::{ffi::c_void, ptr::NonNull};

use crate::{
    Result,
    prot::{ProtectionSet, SharingMode},
    region::MappedRegion,
    resource::ResourceHandle,
    validate::Platform,
};

/// A platform backend that turns an already validated grant into a live mapping.
///
/// Two shapes exist: a single call that creates the mapping with its final
/// protection (`mmap`), and a two-step sequence that first creates a mapping
/// object with a protection ceiling and then maps a view from it. Both satisfy
/// the same contract.
///
/// # Example
/// ```rust,ignore
/// struct MyMapper;
///
/// impl Mapper for MyMapper {
///     const PLATFORM: Platform = Platform::Posix;
///
///     unsafe fn map_raw(
///         grant: ProtectionSet,
///         sharing: SharingMode,
///         handle: &ResourceHandle,
///         offset: usize,
///         len: usize,
///     ) -> Result<NonNull<c_void>> {
///         // Platform-specific implementation
///         todo!()
///     }
///
///     unsafe fn unmap(addr: NonNull<c_void>, len: usize) -> Result<()> {
///         todo!()
///     }
/// }
/// ```
pub trait Mapper {
    /// The platform family whose native primitive this mapper drives.
    const PLATFORM: Platform;

    /// Maps `len` bytes of `handle` starting at `offset` with exactly `grant`.
    ///
    /// Implementations must return [`Error::PlatformUnsupported`] without
    /// issuing any call when the native primitive cannot represent `grant`,
    /// and must release every intermediate object on every failure path.
    ///
    /// # Safety
    /// `grant`, `offset` and `len` must have been accepted by
    /// [`validate`](crate::validate::validate) for this handle. The returned
    /// pointer must eventually be passed to [`Mapper::unmap`] exactly once.
    ///
    /// [`Error::PlatformUnsupported`]: crate::Error::PlatformUnsupported
    unsafe fn map_raw(
        grant: ProtectionSet,
        sharing: SharingMode,
        handle: &ResourceHandle,
        offset: usize,
        len: usize,
    ) -> Result<NonNull<c_void>>;

    /// Releases a mapping created by [`Mapper::map_raw`].
    ///
    /// # Safety
    /// `addr` and `len` must describe a live mapping returned by `map_raw`,
    /// and nothing may access it afterwards.
    unsafe fn unmap(addr: NonNull<c_void>, len: usize) -> Result<()>;

    /// Maps a validated grant and hands ownership of it to a [`MappedRegion`].
    ///
    /// # Safety
    /// Same requirements as [`Mapper::map_raw`] for `grant`, `offset` and `len`.
    unsafe fn map(
        grant: ProtectionSet,
        sharing: SharingMode,
        handle: &ResourceHandle,
        offset: usize,
        len: usize,
    ) -> Result<MappedRegion> {
        let ptr = unsafe { Self::map_raw(grant, sharing, handle, offset, len)? };
        Ok(unsafe { MappedRegion::new(ptr, len, grant, sharing, Self::unmap) })
    }
}
