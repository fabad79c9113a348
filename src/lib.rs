//! # pmem_map
//! Protection-aware memory mapping of persistent-memory resources: regular
//! files on DAX-capable filesystems and device-DAX character devices.
//!
//! ## Usage
//! A mapping is produced in three steps, each with its own failure mode:
//! 1. [`ResourceHandle::open`] opens the resource and records the access mode
//!    it was really opened with, together with its backing kind.
//! 2. [`validate`](validate::validate) decides, without any system call,
//!    whether the requested protection and sharing mode can be granted.
//! 3. A [`Mapper`](os::Mapper) turns the grant into a [`MappedRegion`] whose
//!    page protection the operating system enforces until it is torn down.
//!
//! ## Example
//! ```no_run
//! use pmem_map::{Environment, MapConfig, ProtectionSet, ResourceHandle, ResourceMode};
//!
//! let handle = ResourceHandle::open("/mnt/pmem/log", ResourceMode::ReadWrite).unwrap();
//! let config = MapConfig::new(ProtectionSet::READ);
//! let region = pmem_map::map(&handle, &config, &Environment::current()).unwrap();
//! assert_eq!(region.protection(), ProtectionSet::READ);
//! region.unmap().unwrap();
//! ```
#![no_std]
extern crate alloc;

mod error;
pub mod map;
pub mod os;
pub mod prot;
pub mod region;
pub mod resource;
pub mod scenario;
pub mod validate;

pub use error::{Error, RawOsError};
pub use map::{MapConfig, map, map_with, negotiate};
pub use prot::{ProtectionSet, SharingMode};
pub use region::MappedRegion;
pub use resource::{BackingKind, ResourceHandle, ResourceInfo, ResourceMode};
pub use validate::{DenyReason, Environment, ExecPolicy, MappingOutcome, Platform};

pub type Result<T> = core::result::Result<T, Error>;
