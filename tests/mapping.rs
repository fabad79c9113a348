mod common;

use common::{FILE_SIZE, PAGE, WORD, file_with, holey_file, init_log, path_of};
use pmem_map::{
    DenyReason, Environment, Error, MapConfig, Platform, ProtectionSet, ResourceHandle,
    ResourceMode, SharingMode, map,
};
use rstest::rstest;

fn env() -> Environment {
    Environment::current()
}

fn read_back(path: &str, len: usize) -> Vec<u8> {
    std::fs::read(path).unwrap()[..len].to_vec()
}

#[test]
fn rw_mode_rw_prot_is_visible_to_fresh_shared_mapping() {
    init_log();
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();
    assert_eq!(handle.size(), FILE_SIZE);

    let mut region = map(&handle, &MapConfig::default(), &env()).unwrap();
    assert_eq!(region.len(), FILE_SIZE);
    assert_eq!(region.protection(), ProtectionSet::READ_WRITE);
    assert_eq!(region.sharing(), SharingMode::Shared);
    unsafe { region.as_mut_slice().unwrap()[..WORD.len()].copy_from_slice(WORD) };
    region.unmap().unwrap();

    let fresh = map(&handle, &MapConfig::new(ProtectionSet::READ), &env()).unwrap();
    assert_eq!(unsafe { &fresh.as_slice().unwrap()[..WORD.len()] }, WORD);
    drop(fresh);
    assert_eq!(read_back(path_of(&file), WORD.len()), WORD);
}

#[test]
fn r_mode_rw_prot_is_denied_before_mapping() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadOnly).unwrap();
    assert_eq!(handle.mode(), ResourceMode::ReadOnly);

    for _ in 0..2 {
        let err = map(&handle, &MapConfig::default(), &env()).unwrap_err();
        assert_eq!(
            err.deny_reason(),
            Some(DenyReason::ProtectionExceedsResourceCapability)
        );
        assert_eq!(err.raw_os_error(), None);
    }
}

#[rstest]
#[case(ResourceMode::ReadOnly, SharingMode::Shared)]
#[case(ResourceMode::ReadWrite, SharingMode::Shared)]
#[case(ResourceMode::ReadWrite, SharingMode::Private)]
fn read_grant_exposes_no_mutable_view(#[case] mode: ResourceMode, #[case] sharing: SharingMode) {
    let file = file_with(WORD, FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), mode).unwrap();
    let config = MapConfig::new(ProtectionSet::READ).sharing(sharing);
    let mut region = map(&handle, &config, &env()).unwrap();
    assert_eq!(region.protection(), ProtectionSet::READ);
    assert_eq!(unsafe { &region.as_slice().unwrap()[..WORD.len()] }, WORD);
    assert!(unsafe { region.as_mut_slice() }.is_none());
}

#[cfg(unix)]
#[test]
fn none_grant_exposes_nothing() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();
    let mut region = map(&handle, &MapConfig::new(ProtectionSet::NONE), &env()).unwrap();
    assert!(region.protection().is_none_access());
    assert!(unsafe { region.as_slice() }.is_none());
    assert!(unsafe { region.as_mut_slice() }.is_none());
    region.unmap().unwrap();
}

#[test]
fn none_is_denied_under_debug_tooling() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();
    let err = map(
        &handle,
        &MapConfig::new(ProtectionSet::NONE),
        &env().with_debug_tooling(true),
    )
    .unwrap_err();
    assert_eq!(err.deny_reason(), Some(DenyReason::ToolingUnsupported));
}

#[test]
fn private_mappings_are_isolated() {
    let file = file_with(WORD, FILE_SIZE);
    let path = path_of(&file);
    let handle = ResourceHandle::open(path, ResourceMode::ReadWrite).unwrap();
    let config = MapConfig::default().sharing(SharingMode::Private);

    let mut first = map(&handle, &config, &env()).unwrap();
    let mut second = map(&handle, &config, &env()).unwrap();
    unsafe {
        first.as_mut_slice().unwrap()[..5].copy_from_slice(b"first");
        second.as_mut_slice().unwrap()[..6].copy_from_slice(b"second");
        assert_eq!(&first.as_slice().unwrap()[..5], b"first");
        assert_eq!(&second.as_slice().unwrap()[..6], b"second");
    }

    let shared = map(&handle, &MapConfig::new(ProtectionSet::READ), &env()).unwrap();
    assert_eq!(unsafe { &shared.as_slice().unwrap()[..WORD.len()] }, WORD);
    drop(first);
    drop(second);
    assert_eq!(read_back(path, WORD.len()), WORD);
}

#[test]
fn offset_and_length_select_a_window() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();
    let offset = handle.alignment();

    let config = MapConfig::default().offset(offset).length(PAGE);
    let mut window = map(&handle, &config, &env()).unwrap();
    assert_eq!(window.len(), PAGE);
    unsafe { window.as_mut_slice().unwrap()[..WORD.len()].copy_from_slice(WORD) };
    drop(window);

    let whole = map(&handle, &MapConfig::new(ProtectionSet::READ), &env()).unwrap();
    let bytes = unsafe { whole.as_slice().unwrap() };
    assert_eq!(&bytes[offset..offset + WORD.len()], WORD);
    assert!(bytes[..offset].iter().all(|&b| b == 0));
}

#[test]
fn length_zero_maps_to_the_end() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadOnly).unwrap();
    let offset = handle.alignment();
    let config = MapConfig::new(ProtectionSet::READ).offset(offset);
    let region = map(&handle, &config, &env()).unwrap();
    assert_eq!(region.len(), FILE_SIZE - offset);
}

#[test]
fn range_checks() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();

    let unaligned = MapConfig::default().offset(1).length(PAGE);
    assert_eq!(
        map(&handle, &unaligned, &env()).unwrap_err().deny_reason(),
        Some(DenyReason::UnalignedOrUnsupportedForBacking)
    );

    let too_long = MapConfig::default().length(FILE_SIZE + PAGE);
    assert_eq!(
        map(&handle, &too_long, &env()).unwrap_err().deny_reason(),
        Some(DenyReason::MappingRangeOutOfBounds)
    );

    let empty = holey_file(0);
    let handle = ResourceHandle::open(path_of(&empty), ResourceMode::ReadWrite).unwrap();
    assert_eq!(
        map(&handle, &MapConfig::default(), &env()).unwrap_err().deny_reason(),
        Some(DenyReason::MappingRangeOutOfBounds)
    );
}

#[rstest]
#[case(ProtectionSet::WRITE)]
#[case(ProtectionSet::WRITE | ProtectionSet::EXEC)]
fn write_without_read_is_platform_unsupported(#[case] prot: ProtectionSet) {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWriteExec).unwrap();
    let env = env().with_exec_policy(pmem_map::ExecPolicy::DeclaredAtOpen);
    let err = map(&handle, &MapConfig::new(prot), &env).unwrap_err();
    assert!(matches!(err, Error::PlatformUnsupported { .. }), "{err}");
}

#[test]
fn mismatched_platform_is_refused() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();
    let other = match Platform::current() {
        Platform::Posix => Platform::Windows,
        Platform::Windows => Platform::Posix,
    };
    let err = map(&handle, &MapConfig::default(), &Environment::for_platform(other)).unwrap_err();
    assert!(matches!(err, Error::PlatformUnsupported { .. }), "{err}");
}

#[test]
fn open_missing_path_fails() {
    let err = ResourceHandle::open(
        "target/this_location_is_definitely_non existent:^~",
        ResourceMode::ReadOnly,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Open { .. }), "{err}");
    assert!(err.raw_os_error().is_some());
}

#[cfg(unix)]
#[test]
fn open_directory_fails() {
    let err = ResourceHandle::open(env!("CARGO_TARGET_TMPDIR"), ResourceMode::ReadOnly).unwrap_err();
    assert!(matches!(err, Error::Open { code: None, .. }), "{err}");
}

#[cfg(unix)]
#[test]
fn adopted_descriptor_keeps_its_access_mode() {
    use std::os::fd::IntoRawFd;

    let file = file_with(WORD, FILE_SIZE);
    let fd = std::fs::File::open(file.path()).unwrap().into_raw_fd();
    let handle = unsafe { ResourceHandle::from_raw_fd(fd, "adopted") }.unwrap();
    assert_eq!(handle.mode(), ResourceMode::ReadOnly);
    assert_eq!(handle.name(), "adopted");
    assert!(map(&handle, &MapConfig::default(), &env()).is_err());

    let fd = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(file.path())
        .unwrap()
        .into_raw_fd();
    let handle = unsafe { ResourceHandle::from_raw_fd(fd, "adopted") }.unwrap();
    assert_eq!(handle.mode(), ResourceMode::ReadWrite);
    assert!(map(&handle, &MapConfig::default(), &env()).is_ok());
}

#[test]
fn region_outlives_handle_and_moves_across_threads() {
    let file = file_with(WORD, FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadOnly).unwrap();
    let region = map(&handle, &MapConfig::new(ProtectionSet::READ), &env()).unwrap();
    drop(handle);
    std::thread::spawn(move || {
        assert_eq!(unsafe { &region.as_slice().unwrap()[..WORD.len()] }, WORD);
    })
    .join()
    .unwrap();
}

/// Ordinary file-holding filesystems; pseudo filesystems such as cgroup give
/// directories a meaning of their own.
#[cfg(target_os = "linux")]
const FILE_SYSTEMS: &[&str] = &["tmpfs", "ext2", "ext3", "ext4", "xfs", "btrfs", "f2fs"];

/// A writable directory on a filesystem mounted `noexec`, if there is one.
#[cfg(target_os = "linux")]
fn writable_noexec_dir() -> Option<tempfile::TempDir> {
    let mounts = std::fs::read_to_string("/proc/self/mounts").ok()?;
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let (_, dir, fstype, opts) = (fields.next()?, fields.next()?, fields.next()?, fields.next()?);
        let opts: Vec<&str> = opts.split(',').collect();
        // Octal-escaped mount points are skipped.
        if dir.contains('\\')
            || !FILE_SYSTEMS.contains(&fstype)
            || !opts.contains(&"noexec")
            || !opts.contains(&"rw")
        {
            return None;
        }
        tempfile::tempdir_in(dir).ok()
    })
}

#[cfg(target_os = "linux")]
#[test]
fn exec_capability_is_refused_on_noexec_mounts() {
    let Some(dir) = writable_noexec_dir() else {
        return;
    };
    let path = dir.path().join("pmem_map-noexec");
    std::fs::File::create(&path)
        .unwrap()
        .set_len(FILE_SIZE as u64)
        .unwrap();
    let path = path.to_str().unwrap();

    let err = ResourceHandle::open(path, ResourceMode::ReadWriteExec).unwrap_err();
    assert!(matches!(err, Error::Open { code: None, .. }), "{err}");

    // Only the exec capability is refused, not the file.
    let handle = ResourceHandle::open(path, ResourceMode::ReadWrite).unwrap();
    assert_eq!(handle.mode(), ResourceMode::ReadWrite);
}
