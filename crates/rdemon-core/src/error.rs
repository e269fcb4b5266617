//! Application error types with rich context

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Session Setup Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No free port available: requested {requested}, {available} free")]
    PortExhaustion { requested: usize, available: usize },

    #[error("Failed to launch remote process: {reason}")]
    LaunchFailure { reason: String },

    #[error("\"{tool}\" is not found on the device")]
    ToolMissing { tool: String },

    #[error("Teardown step '{step}' failed: {reason}")]
    TeardownPartialFailure { step: &'static str, reason: String },

    #[error("Operation not valid in session state {state}")]
    InvalidState { state: String },

    // ─────────────────────────────────────────────────────────────
    // Device/Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Executable not found: {name}")]
    ExecutableNotFound { name: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn port_exhaustion(requested: usize, available: usize) -> Self {
        Self::PortExhaustion {
            requested,
            available,
        }
    }

    pub fn launch_failure(reason: impl Into<String>) -> Self {
        Self::LaunchFailure {
            reason: reason.into(),
        }
    }

    pub fn tool_missing(tool: impl Into<String>) -> Self {
        Self::ToolMissing { tool: tool.into() }
    }

    pub fn teardown(step: &'static str, reason: impl Into<String>) -> Self {
        Self::TeardownPartialFailure {
            step,
            reason: reason.into(),
        }
    }

    pub fn invalid_state(state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            state: state.to_string(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave the session running (or leave nothing to
    /// clean up); the operator can carry on without starting over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ToolMissing { .. }
                | Error::TeardownPartialFailure { .. }
                | Error::ChannelSend { .. }
                | Error::InvalidState { .. }
        )
    }

    /// Check if this error terminates the setup phase of a session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::PortExhaustion { .. }
                | Error::LaunchFailure { .. }
                | Error::ProcessSpawn { .. }
                | Error::ExecutableNotFound { .. }
                | Error::Device { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::port_exhaustion(2, 1);
        assert_eq!(
            err.to_string(),
            "No free port available: requested 2, 1 free"
        );

        let err = Error::tool_missing("slog2info");
        assert_eq!(err.to_string(), "\"slog2info\" is not found on the device");

        let err = Error::teardown("kill", "device unreachable");
        assert!(err.to_string().contains("kill"));
        assert!(err.to_string().contains("device unreachable"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::port_exhaustion(1, 0).is_fatal());
        assert!(Error::launch_failure("refused").is_fatal());
        assert!(!Error::tool_missing("slog2info").is_fatal());
        assert!(!Error::teardown("release", "x").is_fatal());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::tool_missing("slog2info").is_recoverable());
        assert!(Error::teardown("kill", "x").is_recoverable());
        assert!(!Error::port_exhaustion(1, 0).is_recoverable());
        assert!(!Error::launch_failure("refused").is_recoverable());
    }

    #[test]
    fn test_invalid_state_uses_display() {
        let err = Error::invalid_state("Running");
        assert_eq!(err.to_string(), "Operation not valid in session state Running");
    }

    #[test]
    fn test_result_ext_preserves_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("reading config").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
