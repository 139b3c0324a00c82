//! Test doubles for code built on the mount harness.

mod mock;

pub use mock::{CallLog, MockCall, MockService};
