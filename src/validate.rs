//! Protection negotiation
//!
//! [`validate`] decides whether a mapping request may be granted. It is a pure
//! function of its input: it makes no system calls and keeps no state, so a
//! denied request can be re-validated any number of times.
use crate::{
    prot::{ProtectionSet, SharingMode},
    resource::{BackingKind, ResourceInfo, ResourceMode},
};
use core::fmt::Display;

/// Operating-system family. Selects the mapper shape and the default exec policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    /// `mmap`-style single-call mapping.
    Posix,
    /// File-mapping object plus view, created in two steps.
    Windows,
}

impl Platform {
    /// The platform this crate was built for.
    pub const fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    pub const fn default_exec_policy(self) -> ExecPolicy {
        match self {
            Platform::Posix => ExecPolicy::ImpliedByRead,
            Platform::Windows => ExecPolicy::DeclaredAtOpen,
        }
    }
}

/// How execute permission on a mapping relates to the resource's open mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecPolicy {
    /// Exec may only be granted if the resource was opened `ReadWriteExec`.
    DeclaredAtOpen,
    /// Exec follows read; it is granted together with `READ` only.
    ImpliedByRead,
}

/// Description of the execution environment a request is evaluated in.
///
/// This is always passed explicitly; nothing is read from global state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Environment {
    pub platform: Platform,
    pub exec_policy: ExecPolicy,
    /// A memory-debugging interposer is active and cannot model no-access pages.
    pub debug_tooling: bool,
}

impl Environment {
    /// Defaults for the build target, with no debugging tools active.
    pub const fn current() -> Self {
        Self::for_platform(Platform::current())
    }

    pub const fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            exec_policy: platform.default_exec_policy(),
            debug_tooling: false,
        }
    }

    #[inline]
    pub const fn with_exec_policy(mut self, exec_policy: ExecPolicy) -> Self {
        self.exec_policy = exec_policy;
        self
    }

    #[inline]
    pub const fn with_debug_tooling(mut self, active: bool) -> Self {
        self.debug_tooling = active;
        self
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::current()
    }
}

/// Why a request was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The requested protection is not permitted by the resource's open mode.
    ProtectionExceedsResourceCapability,
    /// `NONE` combined with other flags, exec without read where exec follows
    /// read, or an empty protection set.
    InvalidProtectionCombination,
    /// The request cannot be one uniform protection domain for this backing:
    /// misaligned offset or length, or a private device-DAX mapping.
    UnalignedOrUnsupportedForBacking,
    /// The active debugging tools cannot represent the requested protection.
    ToolingUnsupported,
    /// The range is empty or extends past the end of the resource.
    MappingRangeOutOfBounds,
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            DenyReason::ProtectionExceedsResourceCapability => {
                "protection exceeds resource capability"
            }
            DenyReason::InvalidProtectionCombination => "invalid protection combination",
            DenyReason::UnalignedOrUnsupportedForBacking => {
                "unaligned or unsupported for backing kind"
            }
            DenyReason::ToolingUnsupported => "unsupported under active debugging tools",
            DenyReason::MappingRangeOutOfBounds => "mapping range out of bounds",
        };
        f.write_str(msg)
    }
}

/// One negotiation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappingRequest {
    pub resource: ResourceInfo,
    pub protection: ProtectionSet,
    pub sharing: SharingMode,
    pub offset: usize,
    /// Length in bytes. Already resolved; zero is never "to the end" here.
    pub length: usize,
    pub env: Environment,
}

/// Result of negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingOutcome {
    /// The protection that will be mapped. Always equal to the requested one.
    Grant(ProtectionSet),
    Deny(DenyReason),
}

impl MappingOutcome {
    #[inline]
    pub fn is_grant(&self) -> bool {
        matches!(self, MappingOutcome::Grant(_))
    }

    #[inline]
    pub fn granted(&self) -> Option<ProtectionSet> {
        match self {
            MappingOutcome::Grant(prot) => Some(*prot),
            MappingOutcome::Deny(_) => None,
        }
    }
}

/// Decides whether `request` may be mapped.
///
/// A grant always carries the requested protection unchanged; the validator
/// can deny but never widen or narrow.
pub fn validate(request: &MappingRequest) -> MappingOutcome {
    match check(request) {
        Ok(()) => MappingOutcome::Grant(request.protection),
        Err(reason) => MappingOutcome::Deny(reason),
    }
}

fn check(req: &MappingRequest) -> core::result::Result<(), DenyReason> {
    use DenyReason::*;
    let prot = req.protection;
    let mode = req.resource.mode;

    if prot.contains(ProtectionSet::WRITE) && mode < ResourceMode::ReadWrite {
        return Err(ProtectionExceedsResourceCapability);
    }
    if prot.contains(ProtectionSet::EXEC) {
        match req.env.exec_policy {
            ExecPolicy::DeclaredAtOpen if mode != ResourceMode::ReadWriteExec => {
                return Err(ProtectionExceedsResourceCapability);
            }
            ExecPolicy::ImpliedByRead if !prot.contains(ProtectionSet::READ) => {
                return Err(InvalidProtectionCombination);
            }
            _ => {}
        }
    }
    if prot.is_malformed() {
        return Err(InvalidProtectionCombination);
    }
    check_backing(req)?;
    if prot.is_none_access() && req.env.debug_tooling {
        return Err(ToolingUnsupported);
    }
    check_range(req)
}

fn check_backing(req: &MappingRequest) -> core::result::Result<(), DenyReason> {
    let align = req.resource.alignment.max(1);
    if req.offset % align != 0 {
        return Err(DenyReason::UnalignedOrUnsupportedForBacking);
    }
    if req.resource.backing == BackingKind::DeviceDaxBacked {
        // A device-DAX mapping is one protection domain of whole device pages,
        // and the driver refuses copy-on-write.
        if req.length % align != 0 || req.sharing == SharingMode::Private {
            return Err(DenyReason::UnalignedOrUnsupportedForBacking);
        }
    }
    Ok(())
}

fn check_range(req: &MappingRequest) -> core::result::Result<(), DenyReason> {
    match req.offset.checked_add(req.length) {
        Some(end) if req.length != 0 && end <= req.resource.size => Ok(()),
        _ => Err(DenyReason::MappingRangeOutOfBounds),
    }
}
