//! Remote Demon Library
//!
//! Runs one remote debug session from the command line. The session logic
//! lives in the workspace crates; this crate wires them to the local device
//! and to stdout.

pub mod headless;

pub use headless::runner::{
    resolve_configuration, run_session, EndReason, RunOptions, SessionOutcome,
};
pub use headless::HeadlessEvent;
