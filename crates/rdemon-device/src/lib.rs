//! # rdemon-device - Device Access and Remote Process Plumbing
//!
//! Everything that talks to a target device on behalf of a debug session:
//! starting processes, tailing the system log and handing out TCP ports.
//!
//! Depends on [`rdemon_core`] for domain types, events and error handling.
//!
//! ## Public API
//!
//! ### Devices
//! - [`Device`] - Target device contract (spawn, signal, port query, tool probe)
//! - [`HostDevice`] - The local machine as a target
//! - [`RemoteProcess`] - Handle to a process started on a device
//!
//! ### Session Plumbing
//! - [`ProcessLauncher`] - Start one remote command and relay its lifecycle
//! - [`LogStreamer`] - Relay `slog2info` lines for one application
//! - [`PortAllocator`] - Device-scoped, all-or-nothing port reservations
//!
//! ### Log Parsing
//! - [`Slog2Filter`] - Select the log lines of one application launch
//! - [`Slog2Line`] - One parsed `slog2info` line

pub mod device;
pub mod host;
pub mod launcher;
pub mod log_stream;
pub mod ports;
pub mod process;
pub mod slog2;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use device::{Device, LocalDevice};
pub use host::{port_available, HostDevice};
pub use launcher::ProcessLauncher;
pub use log_stream::{LogStreamConfig, LogStreamer};
pub use ports::PortAllocator;
pub use process::RemoteProcess;
pub use slog2::{LogTimestamp, Slog2Filter, Slog2Line, MAX_APPLICATION_ID_LEN};
