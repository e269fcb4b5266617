//! # rdemon-core - Core Domain Types
//!
//! Foundation crate for Remote Demon. Provides domain types, error handling,
//! event definitions and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Runnable`] - What the operator asked to run on the target
//! - [`RemoteCommand`] - The command line actually spawned on the device
//! - [`OsVersion`] - Target firmware version
//! - [`SessionState`] - Debug session lifecycle state
//! - [`OutputChannel`] - Origin tag for relayed output
//! - [`LogHelperAvailability`] - Tri-state for the device log tool
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - Raw stdout/stderr/exit from a device process
//! - [`LauncherEvent`] - Start attempt lifecycle
//! - [`LogStreamEvent`] - Device log lines and tool-missing report
//! - [`SessionEvent`] - Everything a session reacts to
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use rdemon_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Remote Demon crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{LauncherEvent, LogStreamEvent, ProcessEvent, SessionEvent};
pub use types::{
    LogHelperAvailability, OsVersion, OutputChannel, RemoteCommand, Runnable, SessionState,
};
