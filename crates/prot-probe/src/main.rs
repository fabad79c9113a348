//! Runs one row of the protection matrix against a resource.
//!
//! Exit status: 0 when the row behaved as expected, 77 when it does not apply
//! here, 2 on any other outcome. A row that expects a fault passes by being
//! killed by the fault signal, so the caller checks for that instead.
mod probe;

use pmem_map::{
    Environment, MapConfig, MappingOutcome, ResourceHandle,
    scenario::{self, Expectation, Scenario},
};
use probe::Failure;
use std::process::ExitCode;

const EXIT_USAGE: u8 = 1;
const EXIT_UNEXPECTED: u8 = 2;
const EXIT_SKIP: u8 = 77;

/// Name fragment of the memcheck preload library.
const MEMCHECK_PRELOAD: &str = "vgpreload_memcheck";

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag] if flag == "--list" => {
            list();
            ExitCode::SUCCESS
        }
        [name, path] => match scenario::find(name) {
            Some(scenario) => run(scenario, path),
            None => {
                eprintln!("unknown scenario: {name}");
                usage()
            }
        },
        _ => usage(),
    }
}

fn usage() -> ExitCode {
    eprintln!("usage: prot-probe <scenario> <path>");
    eprintln!("       prot-probe --list");
    ExitCode::from(EXIT_USAGE)
}

fn list() {
    for s in scenario::MATRIX {
        println!(
            "{:<36} mode={:<3} prot={:<17} {:<7} {:?}",
            s.name,
            s.open_mode.to_string(),
            s.protection.to_string(),
            s.sharing.to_string(),
            s.expect
        );
    }
}

fn under_memcheck() -> bool {
    std::env::var_os("LD_PRELOAD")
        .is_some_and(|preload| preload.to_string_lossy().contains(MEMCHECK_PRELOAD))
}

fn run(scenario: &Scenario, path: &str) -> ExitCode {
    let env = Environment::current().with_debug_tooling(under_memcheck());
    let handle = match ResourceHandle::open(path, scenario.open_mode) {
        Ok(handle) => handle,
        Err(err) => {
            log::error!("{}: {}", scenario.name, err);
            return ExitCode::from(EXIT_UNEXPECTED);
        }
    };
    if !scenario.applies(&env, handle.backing()) {
        println!("{}: skipped on {:?} ({:?})", scenario.name, env, handle.backing());
        return ExitCode::from(EXIT_SKIP);
    }

    let config = MapConfig::new(scenario.protection).sharing(scenario.sharing);
    let result = match scenario.expect {
        Expectation::Denied(reason) => match pmem_map::negotiate(&handle, &config, &env) {
            MappingOutcome::Deny(got) if got == reason => match pmem_map::map(&handle, &config, &env) {
                Err(err) if err.deny_reason() == Some(reason) => Ok(()),
                Err(err) => Err(Failure::Map(err)),
                Ok(_) => Err(Failure::Mismatch("mapping succeeded after a denial".into())),
            },
            other => Err(Failure::Mismatch(format!("expected deny ({reason}), got {other:?}"))),
        },
        Expectation::Granted { faults_on } => {
            probe::granted(&handle, &config, &env, scenario, faults_on)
        }
    };

    match result {
        Ok(()) => {
            println!("{}: ok", scenario.name);
            ExitCode::SUCCESS
        }
        Err(Failure::Skip(why)) => {
            println!("{}: skipped, {}", scenario.name, why);
            ExitCode::from(EXIT_SKIP)
        }
        Err(Failure::Map(err)) => {
            log::error!("{}: {}", scenario.name, err);
            ExitCode::from(EXIT_UNEXPECTED)
        }
        Err(Failure::Mismatch(msg)) => {
            log::error!("{}: {}", scenario.name, msg);
            ExitCode::from(EXIT_UNEXPECTED)
        }
    }
}
