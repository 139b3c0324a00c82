//! Print the resolved `--retval` (`PrjFS_Result` names) and the two paths.

use std::process::ExitCode;

use projfs_test_common::Features;

fn main() -> ExitCode {
    let args = projfs_test_bins::init(Features::RETVAL | Features::VFSAPI);
    projfs_test_bins::finish(projfs_test_bins::report(std::io::stdout().lock(), &args))
}
