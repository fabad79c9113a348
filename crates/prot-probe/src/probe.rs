//! Accesses against a mapped region. A forbidden access is expected to kill
//! the process, so the faulting probe always runs last.
use pmem_map::{
    Environment, Error, MapConfig, MappedRegion, ProtectionSet, ResourceHandle,
    scenario::{Access, Scenario},
};
use std::{io::Write, ptr};

/// Where data probes read and write, past the installed routine.
const DATA_OFFSET: usize = 256;
const WORD: &[u8] = b"Persistent or not, the page says no.";

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        // mov eax, 2; add eax, eax; ret
        const ROUTINE: Option<&[u8]> = Some(&[0xb8, 0x02, 0x00, 0x00, 0x00, 0x01, 0xc0, 0xc3]);
    } else if #[cfg(target_arch = "aarch64")] {
        // mov w0, #2; add w0, w0, w0; ret
        const ROUTINE: Option<&[u8]> = Some(&[
            0x40, 0x00, 0x80, 0x52, 0x00, 0x00, 0x00, 0x0b, 0xc0, 0x03, 0x5f, 0xd6,
        ]);
    } else {
        const ROUTINE: Option<&[u8]> = None;
    }
}

/// What the routine returns.
const ROUTINE_RESULT: i32 = 4;

pub(crate) enum Failure {
    /// The scenario cannot be exercised on this host.
    Skip(&'static str),
    Map(Error),
    Mismatch(String),
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::Map(err)
    }
}

/// Runs every permitted access of `scenario`, then `faults_on`, which must
/// not return.
pub(crate) fn granted(
    handle: &ResourceHandle,
    config: &MapConfig,
    env: &Environment,
    scenario: &Scenario,
    faults_on: Option<Access>,
) -> Result<(), Failure> {
    let executes = scenario.protection.contains(ProtectionSet::EXEC)
        || faults_on == Some(Access::Execute);
    if executes {
        let routine = ROUTINE.ok_or(Failure::Skip("no test routine for this architecture"))?;
        install(handle, env, routine)?;
    }

    let mut region = pmem_map::map(handle, config, env)?;
    for access in scenario.permitted_accesses() {
        perform(&mut region, access)?;
        log::info!("{} succeeded", access);
    }
    if let Some(access) = faults_on {
        log::info!("{} should fault now", access);
        log::logger().flush();
        let _ = std::io::stdout().flush();
        perform(&mut region, access)?;
        return Err(Failure::Mismatch(format!("{access} did not fault")));
    }
    region.unmap()?;
    Ok(())
}

/// Writes the routine to the start of the resource through a separate
/// shared mapping, so the region under test never needs write access for it.
fn install(handle: &ResourceHandle, env: &Environment, routine: &[u8]) -> Result<(), Failure> {
    let mut staging = pmem_map::map(handle, &MapConfig::new(ProtectionSet::READ_WRITE), env)?;
    let bytes = unsafe { staging.as_mut_slice() }
        .ok_or_else(|| Failure::Mismatch("staging mapping is not writable".into()))?;
    bytes[..routine.len()].copy_from_slice(routine);
    staging.unmap()?;
    Ok(())
}

fn perform(region: &mut MappedRegion, access: Access) -> Result<(), Failure> {
    if region.len() < DATA_OFFSET + WORD.len() {
        return Err(Failure::Skip("resource too small to probe"));
    }
    match access {
        Access::Read => {
            let byte = unsafe { ptr::read_volatile(region.as_ptr().add(DATA_OFFSET)) };
            std::hint::black_box(byte);
        }
        Access::Write => {
            let dst = unsafe { region.as_mut_ptr().add(DATA_OFFSET) };
            for (i, &b) in WORD.iter().enumerate() {
                unsafe { ptr::write_volatile(dst.add(i), b) };
            }
            if region.protection().contains(ProtectionSet::READ) {
                let back = unsafe { std::slice::from_raw_parts(dst, WORD.len()) };
                if back != WORD {
                    return Err(Failure::Mismatch("written bytes did not read back".into()));
                }
            }
        }
        Access::Execute => {
            let entry: extern "C" fn() -> i32 = unsafe { std::mem::transmute(region.as_ptr()) };
            let result = entry();
            if result != ROUTINE_RESULT {
                return Err(Failure::Mismatch(format!(
                    "routine returned {result}, expected {ROUTINE_RESULT}"
                )));
            }
        }
    }
    Ok(())
}
