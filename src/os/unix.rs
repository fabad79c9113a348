use crate::{
    Result,
    error::{RawOsError, open_error, syscall_error, unsupported},
    os::Mapper,
    prot::{ProtectionSet, SharingMode},
    resource::{BackingKind, ResourceHandle, ResourceInfo, ResourceMode},
    validate::Platform,
};
use alloc::ffi::CString;
use core::{
    ffi::{c_int, c_void},
    mem::MaybeUninit,
    ptr::{NonNull, null_mut},
};
use libc::{MAP_FAILED, MAP_PRIVATE, MAP_SHARED, O_CLOEXEC, O_RDONLY, O_RDWR, mmap, munmap};

/// Mapper for `mmap`-style platforms: one call creates the mapping with its
/// final protection and sharing mode.
pub struct SingleCallMapper;

pub(crate) struct RawResource {
    fd: c_int,
}

fn native_prot(prot: ProtectionSet) -> c_int {
    let mut bits = libc::PROT_NONE;
    if prot.contains(ProtectionSet::READ) {
        bits |= libc::PROT_READ;
    }
    if prot.contains(ProtectionSet::WRITE) {
        bits |= libc::PROT_WRITE;
    }
    if prot.contains(ProtectionSet::EXEC) {
        bits |= libc::PROT_EXEC;
    }
    bits
}

impl Mapper for SingleCallMapper {
    const PLATFORM: Platform = Platform::Posix;

    unsafe fn map_raw(
        grant: ProtectionSet,
        sharing: SharingMode,
        handle: &ResourceHandle,
        offset: usize,
        len: usize,
    ) -> Result<NonNull<c_void>> {
        if grant.lacks_implied_read() {
            return Err(unsupported("write or exec pages without read cannot be enforced"));
        }
        let flags = match sharing {
            SharingMode::Shared => MAP_SHARED,
            SharingMode::Private => MAP_PRIVATE,
        };
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                native_prot(grant),
                flags,
                handle.as_raw() as c_int,
                offset as libc::off_t,
            )
        };
        if core::ptr::eq(ptr, MAP_FAILED) {
            return Err(syscall_error("mmap failed", errno()));
        }

        #[cfg(feature = "log")]
        log::debug!(
            "Mapped [{}] at {:p} len: {:#x} offset: {:#x} prot: {} sharing: {}",
            handle.name(),
            ptr,
            len,
            offset,
            grant,
            sharing
        );

        NonNull::new(ptr).ok_or_else(|| syscall_error("mmap returned a null mapping", 0))
    }

    unsafe fn unmap(addr: NonNull<c_void>, len: usize) -> Result<()> {
        let res = unsafe { munmap(addr.as_ptr(), len) };
        if res != 0 {
            return Err(syscall_error("munmap failed", errno()));
        }
        Ok(())
    }
}

impl Drop for RawResource {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl RawResource {
    pub(crate) fn open(path: &str, mode: ResourceMode) -> Result<Self> {
        let raw = Self::open_flags(path, open_flags(mode))?;
        if mode == ResourceMode::ReadWriteExec {
            raw.ensure_exec_capable()?;
        }
        Ok(raw)
    }

    fn open_flags(path: &str, flags: c_int) -> Result<Self> {
        let name = CString::new(path).map_err(|_| open_error("path contains a nul byte", None))?;
        let fd = unsafe { libc::open(name.as_ptr(), flags | O_CLOEXEC) };
        if fd == -1 {
            return Err(open_error("open failed", Some(errno())));
        }
        Ok(Self { fd })
    }

    pub(crate) unsafe fn from_raw_fd(fd: c_int) -> Self {
        Self { fd }
    }

    #[inline]
    pub(crate) fn as_raw(&self) -> isize {
        self.fd as isize
    }

    /// The access mode recorded on the descriptor itself.
    pub(crate) fn access_mode(&self) -> Result<ResourceMode> {
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(open_error("fcntl(F_GETFL) failed", Some(errno())));
        }
        match flags & libc::O_ACCMODE {
            O_RDONLY => Ok(ResourceMode::ReadOnly),
            O_RDWR => Ok(ResourceMode::ReadWrite),
            _ => Err(open_error("write-only descriptors cannot be mapped", None)),
        }
    }

    pub(crate) fn classify(&self, mode: ResourceMode) -> Result<ResourceInfo> {
        let mut st = MaybeUninit::<libc::stat>::uninit();
        if unsafe { libc::fstat(self.fd, st.as_mut_ptr()) } != 0 {
            return Err(open_error("fstat failed", Some(errno())));
        }
        let st = unsafe { st.assume_init() };
        match st.st_mode & libc::S_IFMT {
            libc::S_IFREG => Ok(ResourceInfo {
                mode,
                backing: BackingKind::RegularFileBacked,
                size: st.st_size as usize,
                alignment: page_size(),
            }),
            #[cfg(target_os = "linux")]
            libc::S_IFCHR => {
                let (size, alignment) = dax::describe(&st)?;
                Ok(ResourceInfo {
                    mode,
                    backing: BackingKind::DeviceDaxBacked,
                    size,
                    alignment,
                })
            }
            _ => Err(open_error("unsupported file type", None)),
        }
    }

    #[cfg(target_os = "linux")]
    fn ensure_exec_capable(&self) -> Result<()> {
        let mut st = MaybeUninit::<libc::statvfs>::uninit();
        if unsafe { libc::fstatvfs(self.fd, st.as_mut_ptr()) } != 0 {
            return Err(open_error("fstatvfs failed", Some(errno())));
        }
        let st = unsafe { st.assume_init() };
        if st.f_flag & (libc::ST_NOEXEC as libc::c_ulong) != 0 {
            return Err(open_error(
                "execute capability requested on a noexec filesystem",
                None,
            ));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn ensure_exec_capable(&self) -> Result<()> {
        Ok(())
    }

    /// Reads the whole (small) file into `buf`, returning the number of bytes read.
    #[cfg(target_os = "linux")]
    fn read_to_end(&self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let rest = &mut buf[filled..];
            let n = unsafe { libc::read(self.fd, rest.as_mut_ptr() as *mut c_void, rest.len()) };
            if n < 0 {
                return Err(open_error("read failed", Some(errno())));
            } else if n == 0 {
                break;
            }
            filled += n as usize;
        }
        Ok(filled)
    }
}

fn open_flags(mode: ResourceMode) -> c_int {
    match mode {
        ResourceMode::ReadOnly => O_RDONLY,
        // Exec on these platforms follows read; there is no separate open flag.
        ResourceMode::ReadWrite | ResourceMode::ReadWriteExec => O_RDWR,
    }
}

/// Device-DAX discovery through sysfs.
#[cfg(target_os = "linux")]
mod dax {
    use super::RawResource;
    use crate::{Result, error::open_error};
    use alloc::{ffi::CString, format};
    use libc::O_RDONLY;

    const SYS_DEV_CHAR: &str = "/sys/dev/char";

    /// Returns `(size, alignment)` of the device-DAX instance behind `st`.
    pub(super) fn describe(st: &libc::stat) -> Result<(usize, usize)> {
        #[allow(unused_unsafe)]
        let (major, minor) = unsafe { (libc::major(st.st_rdev), libc::minor(st.st_rdev)) };
        let base = format!("{SYS_DEV_CHAR}/{major}:{minor}");
        if !is_dax_subsystem(&base) {
            return Err(open_error("unsupported file type", None));
        }
        describe_at(&base)
    }

    /// Reads size and alignment from the sysfs directory `base` of a device.
    fn describe_at(base: &str) -> Result<(usize, usize)> {
        let size = read_number_at(&format!("{base}/size"))?;
        let alignment = read_number_at(&format!("{base}/device/align"))
            .or_else(|_| read_number_at(&format!("{base}/device/dax_region/align")))?;
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(open_error("device-DAX reports an invalid alignment", None));
        }
        Ok((size, alignment))
    }

    fn is_dax_subsystem(base: &str) -> bool {
        let Ok(link) = CString::new(format!("{base}/subsystem")) else {
            return false;
        };
        let mut buf = [0u8; 256];
        let n = unsafe { libc::readlink(link.as_ptr(), buf.as_mut_ptr() as _, buf.len()) };
        if n <= 0 {
            return false;
        }
        let target = &buf[..n as usize];
        target.rsplit(|&b| b == b'/').next() == Some(b"dax".as_slice())
    }

    fn read_number_at(path: &str) -> Result<usize> {
        let file = RawResource::open_flags(path, O_RDONLY)?;
        let mut buf = [0u8; 32];
        let n = file.read_to_end(&mut buf)?;
        parse_number(&buf[..n]).ok_or_else(|| open_error(format!("cannot parse {path}"), None))
    }

    /// A decimal sysfs attribute, surrounding whitespace allowed.
    fn parse_number(text: &[u8]) -> Option<usize> {
        core::str::from_utf8(text).ok()?.trim().parse().ok()
    }

}

pub(crate) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
}

#[inline]
fn errno() -> RawOsError {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            unsafe { *libc::__errno_location() }
        } else if #[cfg(any(target_os = "android", target_os = "netbsd", target_os = "openbsd"))] {
            unsafe { *libc::__errno() }
        } else if #[cfg(any(target_vendor = "apple", target_os = "freebsd", target_os = "dragonfly"))] {
            unsafe { *libc::__error() }
        } else {
            0
        }
    }
}
