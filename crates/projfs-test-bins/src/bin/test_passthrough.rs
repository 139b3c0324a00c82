//! Mount a plain passthrough projection with no event handlers.

use std::process::ExitCode;

use projfs_test_common::backend::{EventHandlers, Projfs};
use projfs_test_common::{Features, HarnessConfig};

fn main() -> ExitCode {
    let args = projfs_test_bins::init(Features::empty());
    let config = HarnessConfig::from_env();

    projfs_test_bins::serve(
        &args,
        &config,
        Projfs::from_config(&config),
        EventHandlers::passthrough(),
    );

    ExitCode::SUCCESS
}
