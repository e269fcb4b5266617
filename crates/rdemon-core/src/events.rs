//! Domain event definitions
//!
//! Every sub-component of a session reports through these enums. The
//! orchestrator drains them from a single channel, so the order in which they
//! are handled is the order in which they were sent.

// ─────────────────────────────────────────────────────────
// Device Process Events
// ─────────────────────────────────────────────────────────

/// Raw events from a process spawned on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A line of stdout
    Stdout(String),

    /// A line of stderr
    Stderr(String),

    /// Process has exited
    Exited { code: Option<i32> },
}

impl ProcessEvent {
    /// Exit is successful only when the process reported code 0
    pub fn exit_success(code: Option<i32>) -> bool {
        code == Some(0)
    }
}

// ─────────────────────────────────────────────────────────
// Launcher / Streamer Events
// ─────────────────────────────────────────────────────────

/// Lifecycle events of one remote process start attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherEvent {
    /// Device confirmed the process is running
    Started { pid: Option<u32> },

    /// Human-readable progress from the launcher itself
    Progress(String),

    /// Output chunk from the remote process
    Stdout(String),

    /// Error output chunk from the remote process
    Stderr(String),

    /// Start failed, or the device reported an error after start
    Error(String),

    /// Remote process is gone
    Finished { success: bool },
}

/// Events from the device log tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStreamEvent {
    /// The log tool is running on the device
    Started,

    /// One filtered log line
    Line(String),

    /// The log tool does not exist on the device
    ToolMissing,
}

/// Everything the orchestrator reacts to, funnelled through one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Launcher(LauncherEvent),
    LogStream(LogStreamEvent),

    /// Operator or front-end asked to end the session
    EndRequested,
}

impl From<LauncherEvent> for SessionEvent {
    fn from(event: LauncherEvent) -> Self {
        SessionEvent::Launcher(event)
    }
}

impl From<LogStreamEvent> for SessionEvent {
    fn from(event: LogStreamEvent) -> Self {
        SessionEvent::LogStream(event)
    }
}

impl SessionEvent {
    /// Short label for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Launcher(LauncherEvent::Started { .. }) => "launcher_started",
            SessionEvent::Launcher(LauncherEvent::Progress(_)) => "launcher_progress",
            SessionEvent::Launcher(LauncherEvent::Stdout(_)) => "launcher_stdout",
            SessionEvent::Launcher(LauncherEvent::Stderr(_)) => "launcher_stderr",
            SessionEvent::Launcher(LauncherEvent::Error(_)) => "launcher_error",
            SessionEvent::Launcher(LauncherEvent::Finished { .. }) => "launcher_finished",
            SessionEvent::LogStream(LogStreamEvent::Started) => "log_started",
            SessionEvent::LogStream(LogStreamEvent::Line(_)) => "log_line",
            SessionEvent::LogStream(LogStreamEvent::ToolMissing) => "log_tool_missing",
            SessionEvent::EndRequested => "end_requested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_success() {
        assert!(ProcessEvent::exit_success(Some(0)));
        assert!(!ProcessEvent::exit_success(Some(1)));
        assert!(!ProcessEvent::exit_success(None));
    }

    #[test]
    fn test_session_event_from() {
        let event: SessionEvent = LauncherEvent::Finished { success: false }.into();
        assert_eq!(event.event_type(), "launcher_finished");

        let event: SessionEvent = LogStreamEvent::Started.into();
        assert_eq!(event.event_type(), "log_started");

        let event: SessionEvent = LogStreamEvent::ToolMissing.into();
        assert_eq!(event.event_type(), "log_tool_missing");
    }
}
