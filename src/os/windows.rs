use crate::{
    Result,
    error::{RawOsError, open_error, syscall_error, unsupported},
    os::Mapper,
    prot::{ProtectionSet, SharingMode},
    resource::{BackingKind, ResourceHandle, ResourceInfo, ResourceMode},
    validate::Platform,
};
use alloc::vec::Vec;
use core::{
    ffi::c_void,
    mem::MaybeUninit,
    ptr::{NonNull, null, null_mut},
};
use windows_sys::Win32::{
    Foundation::{
        CloseHandle, GENERIC_EXECUTE, GENERIC_READ, GENERIC_WRITE, GetLastError, HANDLE,
        INVALID_HANDLE_VALUE,
    },
    Storage::FileSystem::{
        CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, FILE_SHARE_WRITE, GetFileSizeEx,
        OPEN_EXISTING,
    },
    System::{
        Memory::{
            CreateFileMappingW, FILE_MAP, FILE_MAP_COPY, FILE_MAP_EXECUTE, FILE_MAP_READ,
            FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, PAGE_EXECUTE_READWRITE,
            PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, UnmapViewOfFile,
        },
        SystemInformation::GetSystemInfo,
    },
};

/// Mapper for platforms that map in two steps: a file-mapping object is
/// created with a protection ceiling, then a view with the actual protection.
pub struct TwoStepMapper;

pub(crate) struct RawResource {
    handle: HANDLE,
}

/// The intermediate file-mapping object. Closed when dropped, so it is
/// released on every exit path of [`TwoStepMapper::map_raw`].
struct FileMapping(HANDLE);

impl Drop for FileMapping {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// The highest protection a mapping object created from a handle opened
/// with `mode` may carry.
fn ceiling(mode: ResourceMode) -> PAGE_PROTECTION_FLAGS {
    match mode {
        ResourceMode::ReadOnly => PAGE_READONLY,
        ResourceMode::ReadWrite => PAGE_READWRITE,
        ResourceMode::ReadWriteExec => PAGE_EXECUTE_READWRITE,
    }
}

fn view_access(grant: ProtectionSet, sharing: SharingMode) -> FILE_MAP {
    let mut access = FILE_MAP_READ;
    if grant.contains(ProtectionSet::WRITE) {
        access |= match sharing {
            SharingMode::Shared => FILE_MAP_WRITE,
            SharingMode::Private => FILE_MAP_COPY,
        };
    }
    if grant.contains(ProtectionSet::EXEC) {
        access |= FILE_MAP_EXECUTE;
    }
    access
}

impl Mapper for TwoStepMapper {
    const PLATFORM: Platform = Platform::Windows;

    unsafe fn map_raw(
        grant: ProtectionSet,
        sharing: SharingMode,
        handle: &ResourceHandle,
        offset: usize,
        len: usize,
    ) -> Result<NonNull<c_void>> {
        // PAGE_NOACCESS is not accepted by CreateFileMapping.
        if grant.is_none_access() {
            return Err(unsupported("no-access file mappings"));
        }
        if grant.lacks_implied_read() {
            return Err(unsupported("write or exec views without read"));
        }
        if grant.contains(ProtectionSet::EXEC) && handle.mode() != ResourceMode::ReadWriteExec {
            return Err(unsupported(
                "exec views of a resource not opened with execute access",
            ));
        }

        let object = unsafe {
            CreateFileMappingW(
                handle.as_raw() as HANDLE,
                null(),
                ceiling(handle.mode()),
                0,
                0,
                null(),
            )
        };
        if object.is_null() {
            return Err(syscall_error("CreateFileMappingW failed", last_error()));
        }
        let object = FileMapping(object);

        let offset = offset as u64;
        let view = unsafe {
            MapViewOfFile(
                object.0,
                view_access(grant, sharing),
                (offset >> 32) as u32,
                offset as u32,
                len,
            )
        };
        if view.Value.is_null() {
            return Err(syscall_error("MapViewOfFile failed", last_error()));
        }

        #[cfg(feature = "log")]
        log::debug!(
            "Mapped [{}] at {:p} len: {:#x} offset: {:#x} prot: {} sharing: {}",
            handle.name(),
            view.Value,
            len,
            offset,
            grant,
            sharing
        );

        // The view keeps the section alive; the object handle is closed here.
        drop(object);
        NonNull::new(view.Value).ok_or_else(|| syscall_error("MapViewOfFile returned null", 0))
    }

    unsafe fn unmap(addr: NonNull<c_void>, _len: usize) -> Result<()> {
        let view = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: addr.as_ptr(),
        };
        if unsafe { UnmapViewOfFile(view) } == 0 {
            return Err(syscall_error("UnmapViewOfFile failed", last_error()));
        }
        Ok(())
    }
}

impl Drop for RawResource {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.handle) };
    }
}

impl RawResource {
    pub(crate) fn open(path: &str, mode: ResourceMode) -> Result<Self> {
        let mut wide_path = Vec::<u16>::with_capacity(path.len() + 1);
        wide_path.extend(path.encode_utf16());
        wide_path.push(0);

        let access = match mode {
            ResourceMode::ReadOnly => GENERIC_READ,
            ResourceMode::ReadWrite => GENERIC_READ | GENERIC_WRITE,
            ResourceMode::ReadWriteExec => GENERIC_READ | GENERIC_WRITE | GENERIC_EXECUTE,
        };
        let handle = unsafe {
            CreateFileW(
                wide_path.as_ptr(),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(open_error("CreateFileW failed", Some(last_error())));
        }
        Ok(Self { handle })
    }

    #[inline]
    pub(crate) fn as_raw(&self) -> isize {
        self.handle as isize
    }

    pub(crate) fn classify(&self, mode: ResourceMode) -> Result<ResourceInfo> {
        let mut size = 0i64;
        if unsafe { GetFileSizeEx(self.handle, &mut size) } == 0 {
            return Err(open_error("GetFileSizeEx failed", Some(last_error())));
        }
        Ok(ResourceInfo {
            mode,
            backing: BackingKind::RegularFileBacked,
            size: size as usize,
            alignment: allocation_granularity(),
        })
    }
}

/// Views must start on this boundary.
pub(crate) fn allocation_granularity() -> usize {
    let mut sys_info = MaybeUninit::uninit();
    unsafe {
        GetSystemInfo(sys_info.as_mut_ptr());
        sys_info.assume_init().dwAllocationGranularity as usize
    }
}

#[inline]
fn last_error() -> RawOsError {
    unsafe { GetLastError() as RawOsError }
}
