#![cfg(windows)]

mod common;

use common::{FILE_SIZE, PAGE, holey_file, path_of};
use pmem_map::{
    Error, ProtectionSet, ResourceHandle, ResourceMode, SharingMode,
    os::{Mapper, TwoStepMapper},
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, GetProcessHandleCount};

fn handle_count() -> u32 {
    let mut count = 0;
    assert_ne!(unsafe { GetProcessHandleCount(GetCurrentProcess(), &mut count) }, 0);
    count
}

#[test]
fn mapping_object_is_released_on_every_path() {
    let file = holey_file(FILE_SIZE);
    let handle = ResourceHandle::open(path_of(&file), ResourceMode::ReadWrite).unwrap();
    let before = handle_count();

    // The object is created, the view past the end of the file is not.
    let past_end = (FILE_SIZE / handle.alignment() + 1) * handle.alignment() * 2;
    let err = unsafe {
        TwoStepMapper::map_raw(
            ProtectionSet::READ_WRITE,
            SharingMode::Shared,
            &handle,
            past_end,
            PAGE,
        )
    }
    .unwrap_err();
    assert!(matches!(err, Error::MappingSyscall { .. }), "{err}");
    assert!(err.raw_os_error().is_some());
    assert_eq!(handle_count(), before);

    // On success the view outlives the object handle.
    let view = unsafe {
        TwoStepMapper::map_raw(ProtectionSet::READ, SharingMode::Shared, &handle, 0, PAGE)
    }
    .unwrap();
    assert_eq!(handle_count(), before);
    unsafe { TwoStepMapper::unmap(view, PAGE) }.unwrap();
    assert_eq!(handle_count(), before);
}
