//! Core domain type definitions

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ─────────────────────────────────────────────────────────
// Session State
// ─────────────────────────────────────────────────────────

/// Lifecycle state of a debug session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing running, nothing reserved
    #[default]
    Inactive,
    /// Ports reserved, waiting for the launcher to confirm the start
    StartingRemoteProcess,
    /// Remote process confirmed running
    Running,
    /// Teardown in progress
    Finishing,
}

impl SessionState {
    /// Whether an "end session" request is accepted in this state
    pub fn accepts_end(&self) -> bool {
        matches!(
            self,
            SessionState::StartingRemoteProcess | SessionState::Running
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "Inactive"),
            SessionState::StartingRemoteProcess => write!(f, "StartingRemoteProcess"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Finishing => write!(f, "Finishing"),
        }
    }
}

/// Whether the device's log tool is known to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogHelperAvailability {
    #[default]
    Unknown,
    Yes,
    No,
}

/// Which kind of output a front-end message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    /// Debuggee stdout and device log lines
    AppOutput,
    /// Debuggee stderr and runtime launch errors
    AppError,
    /// Progress and setup messages from the orchestrator
    Diagnostic,
}

impl OutputChannel {
    pub fn label(&self) -> &'static str {
        match self {
            OutputChannel::AppOutput => "out",
            OutputChannel::AppError => "err",
            OutputChannel::Diagnostic => "diag",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Runnable / Remote Command
// ─────────────────────────────────────────────────────────

/// Immutable snapshot of what the operator asked to run
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Runnable {
    /// Path of the executable on the target
    pub executable: String,

    /// Arguments passed to the executable, in order
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Extra environment for the process
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Working directory on the target
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

impl Runnable {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Application identifier used to scope the device log: the executable's
    /// base name.
    pub fn application_id(&self) -> String {
        Path::new(&self.executable)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.clone())
    }
}

/// A fully-built command line, ready to be spawned on a device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RemoteCommand {
    pub executable: String,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl RemoteCommand {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Executable followed by its arguments
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.executable.clone())
            .chain(self.arguments.iter().cloned())
            .collect()
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line().join(" "))
    }
}

// ─────────────────────────────────────────────────────────
// Device OS Version
// ─────────────────────────────────────────────────────────

/// Target OS/firmware version, ordered component-wise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OsVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl OsVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Packed `0xMMmmpp` form used by device firmware
    pub fn as_hex(&self) -> u32 {
        (u32::from(self.major) << 16) | (u32::from(self.minor) << 8) | u32::from(self.patch)
    }

    pub fn from_hex(value: u32) -> Self {
        Self {
            major: ((value >> 16) & 0xff) as u8,
            minor: ((value >> 8) & 0xff) as u8,
            patch: (value & 0xff) as u8,
        }
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for OsVersion {
    type Err = Error;

    /// Parses `"6.5"`, `"6.5.0"` or `"7"`; missing parts default to zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u8; 3];
        let mut count = 0;
        for (i, part) in s.trim().split('.').enumerate() {
            if i >= 3 {
                return Err(Error::config_invalid(format!("bad OS version '{}'", s)));
            }
            parts[i] = part
                .parse()
                .map_err(|_| Error::config_invalid(format!("bad OS version '{}'", s)))?;
            count += 1;
        }
        if count == 0 {
            return Err(Error::config_invalid("empty OS version"));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl Serialize for OsVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OsVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_id_is_base_name() {
        let runnable = Runnable::new("/accounts/devuser/app/bin/cascades-demo");
        assert_eq!(runnable.application_id(), "cascades-demo");
    }

    #[test]
    fn test_application_id_without_directory() {
        let runnable = Runnable::new("demo");
        assert_eq!(runnable.application_id(), "demo");
    }

    #[test]
    fn test_runnable_builder() {
        let runnable = Runnable::new("/bin/app")
            .with_arguments(["-v", "--fast"])
            .with_env("QT_DEBUG", "1")
            .with_working_directory("/tmp");
        assert_eq!(runnable.arguments, vec!["-v", "--fast"]);
        assert_eq!(runnable.environment.get("QT_DEBUG").map(String::as_str), Some("1"));
        assert_eq!(runnable.working_directory, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_remote_command_line() {
        let cmd = RemoteCommand::new("pdebug").arg("10000");
        assert_eq!(cmd.command_line(), vec!["pdebug", "10000"]);
        assert_eq!(cmd.to_string(), "pdebug 10000");
    }

    #[test]
    fn test_os_version_parse() {
        assert_eq!("6.5.0".parse::<OsVersion>().unwrap(), OsVersion::new(6, 5, 0));
        assert_eq!("7.1".parse::<OsVersion>().unwrap(), OsVersion::new(7, 1, 0));
        assert_eq!("8".parse::<OsVersion>().unwrap(), OsVersion::new(8, 0, 0));
        assert!("".parse::<OsVersion>().is_err());
        assert!("6.x".parse::<OsVersion>().is_err());
        assert!("1.2.3.4".parse::<OsVersion>().is_err());
    }

    #[test]
    fn test_os_version_ordering_matches_hex() {
        let old = OsVersion::new(6, 5, 0);
        let new = OsVersion::new(6, 6, 0);
        assert!(new > old);
        assert_eq!(old.as_hex(), 0x060500);
        assert_eq!(OsVersion::from_hex(0x070102), OsVersion::new(7, 1, 2));
    }

    #[test]
    fn test_session_state_accepts_end() {
        assert!(!SessionState::Inactive.accepts_end());
        assert!(SessionState::StartingRemoteProcess.accepts_end());
        assert!(SessionState::Running.accepts_end());
        assert!(!SessionState::Finishing.accepts_end());
    }
}
