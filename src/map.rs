//! Negotiating and creating mappings
use crate::{
    Result,
    error::{denied, unsupported},
    os::Mapper,
    prot::{ProtectionSet, SharingMode},
    region::MappedRegion,
    resource::ResourceHandle,
    validate::{Environment, MappingOutcome, MappingRequest, validate},
};

/// Per-mapping request parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapConfig {
    protection: ProtectionSet,
    sharing: SharingMode,
    offset: usize,
    length: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::new(ProtectionSet::READ_WRITE)
    }
}

impl MapConfig {
    /// A shared mapping of the whole resource with `protection`.
    pub const fn new(protection: ProtectionSet) -> Self {
        Self {
            protection,
            sharing: SharingMode::Shared,
            offset: 0,
            length: 0,
        }
    }

    #[inline]
    pub const fn sharing(mut self, sharing: SharingMode) -> Self {
        self.sharing = sharing;
        self
    }

    #[inline]
    pub const fn protection(mut self, protection: ProtectionSet) -> Self {
        self.protection = protection;
        self
    }

    /// Byte offset into the resource. Must respect the resource's alignment.
    #[inline]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Number of bytes to map. `0` maps from the offset to the end of the resource.
    #[inline]
    pub const fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Builds the validator's view of mapping `handle` with this config in `env`.
    pub fn request(&self, handle: &ResourceHandle, env: &Environment) -> MappingRequest {
        let resource = handle.info();
        let length = if self.length == 0 {
            resource.size.saturating_sub(self.offset)
        } else {
            self.length
        };
        MappingRequest {
            resource,
            protection: self.protection,
            sharing: self.sharing,
            offset: self.offset,
            length,
            env: *env,
        }
    }
}

/// Runs the validator for `config` against `handle` without touching the OS.
pub fn negotiate(handle: &ResourceHandle, config: &MapConfig, env: &Environment) -> MappingOutcome {
    validate(&config.request(handle, env))
}

/// Negotiates and, on a grant, maps the resource with mapper `M`.
///
/// Policy denials come back as [`Error::Denied`](crate::Error::Denied) before
/// anything is allocated; failures of the mapping call itself come back as
/// [`Error::MappingSyscall`](crate::Error::MappingSyscall) or
/// [`Error::PlatformUnsupported`](crate::Error::PlatformUnsupported).
/// The latter is also returned if `env` describes a platform other than the
/// one `M` drives.
pub fn map_with<M: Mapper>(
    handle: &ResourceHandle,
    config: &MapConfig,
    env: &Environment,
) -> Result<MappedRegion> {
    if env.platform != M::PLATFORM {
        return Err(unsupported("environment platform does not match the mapper"));
    }
    let request = config.request(handle, env);
    match validate(&request) {
        MappingOutcome::Grant(grant) => {
            #[cfg(feature = "log")]
            log::debug!(
                "Granted [{}] prot: {} sharing: {} offset: {:#x} len: {:#x}",
                handle.name(),
                grant,
                request.sharing,
                request.offset,
                request.length
            );
            unsafe { M::map(grant, request.sharing, handle, request.offset, request.length) }
        }
        MappingOutcome::Deny(reason) => {
            #[cfg(feature = "log")]
            log::warn!(
                "Denied [{}] prot: {} sharing: {}: {}",
                handle.name(),
                request.protection,
                request.sharing,
                reason
            );
            Err(denied(reason))
        }
    }
}

/// [`map_with`] using the mapper of the build target.
#[inline]
pub fn map(handle: &ResourceHandle, config: &MapConfig, env: &Environment) -> Result<MappedRegion> {
    map_with::<crate::os::DefaultMapper>(handle, config, env)
}
