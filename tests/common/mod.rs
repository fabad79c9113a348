#![allow(dead_code)]

use pmem_map::{BackingKind, ResourceInfo, ResourceMode};
use std::io::Write;
use tempfile::NamedTempFile;

/// Size of the sparse files the tests map.
pub const FILE_SIZE: usize = 16 << 20;

pub const PAGE: usize = 4096;

pub const WORD: &[u8] = b"Persistent memory keeps what you write.";

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a sparse file of `size` bytes under the cargo target directory.
///
/// `/tmp` may be mounted `noexec`, which would make the exec cases fail for
/// reasons unrelated to the code under test.
pub fn holey_file(size: usize) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .prefix("pmem_map-")
        .tempfile_in(env!("CARGO_TARGET_TMPDIR"))
        .unwrap();
    file.as_file().set_len(size as u64).unwrap();
    file
}

/// A sparse file whose first bytes are `prefix`.
pub fn file_with(prefix: &[u8], size: usize) -> NamedTempFile {
    let mut file = holey_file(size);
    file.write_all(prefix).unwrap();
    file.flush().unwrap();
    file
}

pub fn path_of(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

pub fn file_info(mode: ResourceMode) -> ResourceInfo {
    ResourceInfo {
        mode,
        backing: BackingKind::RegularFileBacked,
        size: FILE_SIZE,
        alignment: PAGE,
    }
}

pub fn devdax_info(mode: ResourceMode) -> ResourceInfo {
    ResourceInfo {
        mode,
        backing: BackingKind::DeviceDaxBacked,
        size: 64 << 20,
        alignment: 2 << 20,
    }
}
