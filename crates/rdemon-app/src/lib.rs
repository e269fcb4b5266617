//! # rdemon-app - Debug Session Orchestration
//!
//! Composes the device plumbing of [`rdemon_device`] into debug sessions:
//! reserves ports, builds the remote command line for the requested
//! debuggers, starts the remote process and its log stream, and reports to a
//! debugger front-end until the session is torn down.
//!
//! ## Public API
//!
//! ### Orchestration
//! - [`SessionOrchestrator`] - State machine for one debug session
//! - [`SessionControl`] - Cloneable handle to end a session from another task
//! - [`TeardownReport`] - What a teardown pass did
//!
//! ### Front-End
//! - [`DebuggerFrontEnd`] - Notification sink implemented by consumers
//! - [`ChannelFrontEnd`] - Forwards notifications as [`FrontEndEvent`]s
//! - [`SetupResult`] - Outcome of the setup phase
//!
//! ### Session Data
//! - [`Session`], [`SessionId`], [`DebugCapabilities`], [`SessionPorts`]
//! - [`build_remote_command()`], [`script_debug_argument()`]
//!
//! ### Configuration
//! - [`config::Settings`] - `.rdemon/config.toml`
//! - [`config::RunConfiguration`] - `.rdemon/launch.toml` entries

pub mod command_line;
pub mod config;
pub mod front_end;
pub mod orchestrator;
pub mod session;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use command_line::{build_remote_command, script_debug_argument};
pub use front_end::{ChannelFrontEnd, DebuggerFrontEnd, FrontEndEvent, SetupResult};
pub use orchestrator::{
    SessionControl, SessionOrchestrator, TeardownReport, SESSION_CHANNEL_CAPACITY,
};
pub use session::{next_session_id, DebugCapabilities, Session, SessionId, SessionPorts};
