//! Mount the in-process mock service, so the harness can be driven without
//! libprojfs.
//!
//! The `--retval` value is handed to the mock as its handlers. Setting
//! `PROJFS_TEST_MOCK_FAIL` to `create` or `start` makes that step fail with
//! the same value as its status. After shutdown the recorded calls are
//! printed, one per line.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use projfs_test_common::testing::{CallLog, MockService};
use projfs_test_common::{Features, HarnessConfig, ServiceError};

const FAIL_ENV: &str = "PROJFS_TEST_MOCK_FAIL";

fn service(status: i32) -> MockService {
    let service = MockService::new();
    match std::env::var(FAIL_ENV).as_deref() {
        Ok("create") => service.fail_create(ServiceError::Status(status)),
        Ok("start") => service.fail_start(ServiceError::Status(status)),
        Ok(other) => {
            tracing::warn!("ignoring {}={}", FAIL_ENV, other);
            service
        }
        Err(_) => service,
    }
}

fn print_calls(calls: &CallLog) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for call in calls.snapshot() {
        writeln!(out, "{call:?}")?;
    }
    out.flush().context("Failed to write calls")?;
    Ok(())
}

fn main() -> ExitCode {
    let args = projfs_test_bins::init(Features::RETVAL);
    let config = HarnessConfig::from_env();

    let status = args.settings.retval().unwrap_or_default();
    let service = service(status);
    let calls = service.calls();

    projfs_test_bins::serve(&args, &config, service, status);

    projfs_test_bins::finish(print_calls(&calls))
}
