//! Pieces shared by the test programs in `src/bin`.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use projfs_test_common::{
    Features, HarnessConfig, MountArgs, ProjectionService, ShutdownToken, logging,
    parse_mount_opts, start_mount_or_exit, wait_for_shutdown,
};

/// Install logging and parse `<lower-path> <mount-path>` plus the options
/// in `features`, exiting on a command-line error.
pub fn init(features: Features) -> MountArgs {
    logging::init(0);
    parse_mount_opts(std::env::args_os(), features).unwrap_or_else(|err| err.exit())
}

/// Map the result of a program's `run` onto its exit status.
pub fn finish(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// The `--retval` line printed by the reporting programs.
pub fn describe_retval(retval: Option<i32>) -> String {
    match retval {
        Some(value) => format!("retval: {value}"),
        None => "retval: unset".to_string(),
    }
}

/// Print what was parsed from the command line, one item per line.
pub fn report(mut out: impl Write, args: &MountArgs) -> Result<()> {
    writeln!(out, "{}", describe_retval(args.settings.retval()))?;
    writeln!(out, "lower: {}", args.lower_path.display())?;
    writeln!(out, "mount: {}", args.mount_path.display())?;
    out.flush().context("Failed to write report")?;
    Ok(())
}

/// Mount, wait for Enter or a termination signal, unmount.
pub fn serve<S: ProjectionService>(
    args: &MountArgs,
    config: &HarnessConfig,
    service: S,
    handlers: S::Handlers,
) -> S::Stopped {
    let mount = start_mount_or_exit(
        args.settings.program(),
        service,
        &args.lower_path,
        &args.mount_path,
        handlers,
    );

    let outcome = wait_for_shutdown(&ShutdownToken::new(), config);
    tracing::info!(?outcome, "stopping");

    mount.stop()
}
