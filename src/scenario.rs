//! The protection matrix as data
//!
//! Each [`Scenario`] states which environments it applies to in its
//! [`Requirements`]; a driver filters the table against an explicit
//! [`Environment`] and backing kind instead of relying on global registries.
use crate::{
    prot::{ProtectionSet, SharingMode},
    resource::{BackingKind, ResourceMode},
    validate::{DenyReason, Environment, ExecPolicy, Platform},
};
use core::fmt::Display;

/// One kind of access a driver performs against a mapped region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    /// The protection flag that makes this access legal.
    pub const fn required(self) -> ProtectionSet {
        match self {
            Access::Read => ProtectionSet::READ,
            Access::Write => ProtectionSet::WRITE,
            Access::Execute => ProtectionSet::EXEC,
        }
    }
}

impl Display for Access {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
            Access::Execute => f.write_str("execute"),
        }
    }
}

/// Environment predicates a scenario needs to be meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requirements {
    pub platform: Option<Platform>,
    pub exec_policy: Option<ExecPolicy>,
    pub backing: Option<BackingKind>,
    /// Skip when a memory-debugging interposer is active.
    pub excluded_debug_tooling: bool,
}

impl Requirements {
    /// Applies everywhere.
    pub const ANY: Self = Self {
        platform: None,
        exec_policy: None,
        backing: None,
        excluded_debug_tooling: false,
    };

    pub const fn on(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub const fn exec_policy(mut self, policy: ExecPolicy) -> Self {
        self.exec_policy = Some(policy);
        self
    }

    pub const fn backing(mut self, backing: BackingKind) -> Self {
        self.backing = Some(backing);
        self
    }

    pub const fn without_debug_tooling(mut self) -> Self {
        self.excluded_debug_tooling = true;
        self
    }

    pub fn admits(&self, env: &Environment, backing: BackingKind) -> bool {
        self.platform.is_none_or(|p| p == env.platform)
            && self.exec_policy.is_none_or(|p| p == env.exec_policy)
            && self.backing.is_none_or(|b| b == backing)
            && !(self.excluded_debug_tooling && env.debug_tooling)
    }
}

/// What a scenario must observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// Negotiation refuses the request for this reason.
    Denied(DenyReason),
    /// Negotiation grants the request. Every access the grant allows must
    /// succeed; `faults_on`, if set, names an access that must fault.
    Granted { faults_on: Option<Access> },
}

/// One row of the protection matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub open_mode: ResourceMode,
    pub protection: ProtectionSet,
    pub sharing: SharingMode,
    pub requires: Requirements,
    pub expect: Expectation,
}

impl Scenario {
    pub fn applies(&self, env: &Environment, backing: BackingKind) -> bool {
        self.requires.admits(env, backing)
    }

    /// Accesses that must succeed, in the order a driver should try them.
    pub fn permitted_accesses(&self) -> impl Iterator<Item = Access> + '_ {
        [Access::Read, Access::Write, Access::Execute]
            .into_iter()
            .filter(|access| self.protection.contains(access.required()))
    }
}

use Access::*;
use BackingKind::*;
use ResourceMode::*;
use SharingMode::*;

const FILE: Requirements = Requirements::ANY.backing(RegularFileBacked);
const DEVDAX: Requirements = Requirements::ANY.on(Platform::Posix).backing(DeviceDaxBacked);

const fn row(
    name: &'static str,
    open_mode: ResourceMode,
    protection: ProtectionSet,
    sharing: SharingMode,
    requires: Requirements,
    expect: Expectation,
) -> Scenario {
    Scenario {
        name,
        open_mode,
        protection,
        sharing,
        requires,
        expect,
    }
}

const fn granted(faults_on: Option<Access>) -> Expectation {
    Expectation::Granted { faults_on }
}

const fn denied(reason: DenyReason) -> Expectation {
    Expectation::Denied(reason)
}

const EXCEEDS: DenyReason = DenyReason::ProtectionExceedsResourceCapability;

/// The protection/mode matrix.
pub static MATRIX: &[Scenario] = &[
    row("rw_mode_rw_prot", ReadWrite, ProtectionSet::READ_WRITE, Shared, FILE, granted(None)),
    row(
        "rw_mode_rw_prot_private",
        ReadWrite,
        ProtectionSet::READ_WRITE,
        Private,
        FILE,
        granted(None),
    ),
    row("r_mode_rw_prot", ReadOnly, ProtectionSet::READ_WRITE, Shared, Requirements::ANY, denied(EXCEEDS)),
    row(
        "rw_mode_rwx_prot",
        ReadWrite,
        ProtectionSet::READ_WRITE_EXEC,
        Shared,
        Requirements::ANY.exec_policy(ExecPolicy::DeclaredAtOpen),
        denied(EXCEEDS),
    ),
    row(
        "rw_mode_rx_prot",
        ReadWrite,
        ProtectionSet::READ_EXEC,
        Shared,
        Requirements::ANY.exec_policy(ExecPolicy::DeclaredAtOpen),
        denied(EXCEEDS),
    ),
    row(
        "rw_mode_rx_prot_exec_follows_read",
        ReadWrite,
        ProtectionSet::READ_EXEC,
        Shared,
        FILE.exec_policy(ExecPolicy::ImpliedByRead),
        granted(Some(Write)),
    ),
    row("rw_mode_r_prot", ReadWrite, ProtectionSet::READ, Shared, FILE, granted(Some(Write))),
    row("rw_mode_r_prot_private", ReadWrite, ProtectionSet::READ, Private, FILE, granted(Some(Write))),
    row("r_mode_r_prot", ReadOnly, ProtectionSet::READ, Shared, FILE, granted(Some(Write))),
    row(
        "rw_mode_none_prot",
        ReadWrite,
        ProtectionSet::NONE,
        Shared,
        FILE.on(Platform::Posix).without_debug_tooling(),
        granted(Some(Read)),
    ),
    row(
        "rw_mode_none_prot_do_write",
        ReadWrite,
        ProtectionSet::NONE,
        Shared,
        FILE.on(Platform::Posix).without_debug_tooling(),
        granted(Some(Write)),
    ),
    row(
        "rw_mode_none_prot_do_execute",
        ReadWrite,
        ProtectionSet::NONE,
        Shared,
        FILE.on(Platform::Posix).without_debug_tooling(),
        granted(Some(Execute)),
    ),
    row("rwx_mode_rx_prot", ReadWriteExec, ProtectionSet::READ_EXEC, Shared, FILE, granted(Some(Write))),
    row(
        "rwx_mode_rx_prot_private",
        ReadWriteExec,
        ProtectionSet::READ_EXEC,
        Private,
        FILE,
        granted(Some(Write)),
    ),
    row("rwx_mode_rwx_prot", ReadWriteExec, ProtectionSet::READ_WRITE_EXEC, Shared, FILE, granted(None)),
    row(
        "rwx_mode_rwx_prot_private",
        ReadWriteExec,
        ProtectionSet::READ_WRITE_EXEC,
        Private,
        FILE,
        granted(None),
    ),
    row(
        "rw_mode_rw_prot_do_execute",
        ReadWrite,
        ProtectionSet::READ_WRITE,
        Shared,
        FILE,
        granted(Some(Execute)),
    ),
    row(
        "rw_mode_rw_prot_private_do_execute",
        ReadWrite,
        ProtectionSet::READ_WRITE,
        Private,
        FILE,
        granted(Some(Execute)),
    ),
    row("devdax_rw_mode_rw_prot", ReadWrite, ProtectionSet::READ_WRITE, Shared, DEVDAX, granted(None)),
    row(
        "devdax_rwx_mode_rx_prot",
        ReadWriteExec,
        ProtectionSet::READ_EXEC,
        Shared,
        DEVDAX,
        granted(Some(Write)),
    ),
    row(
        "devdax_rw_mode_rw_prot_private",
        ReadWrite,
        ProtectionSet::READ_WRITE,
        Private,
        DEVDAX,
        denied(DenyReason::UnalignedOrUnsupportedForBacking),
    ),
];

/// Rows of [`MATRIX`] that apply to `env` and a resource of kind `backing`.
pub fn select(env: &Environment, backing: BackingKind) -> impl Iterator<Item = &'static Scenario> + '_ {
    MATRIX.iter().filter(move |s| s.applies(env, backing))
}

/// Looks a row up by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    MATRIX.iter().find(|s| s.name == name)
}
