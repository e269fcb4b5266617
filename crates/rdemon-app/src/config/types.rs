//! Configuration types for Remote Demon
//!
//! Defines:
//! - `Settings` - Orchestrator settings (`.rdemon/config.toml`)
//! - `RunConfiguration` - A single run configuration (`.rdemon/launch.toml`)
//! - `DebugSettings` - The settings slice a session orchestrator consumes

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use rdemon_core::{OsVersion, Runnable};

use crate::session::DebugCapabilities;

/// Application settings (.rdemon/config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub debugger: DebuggerSettings,

    #[serde(default)]
    pub ports: PortSettings,

    #[serde(default)]
    pub log_stream: LogStreamSettings,

    #[serde(default)]
    pub device: DeviceSettings,
}

impl Settings {
    pub fn debug_settings(&self) -> DebugSettings {
        DebugSettings {
            helper_executable: self.debugger.helper_executable.clone(),
            script_debug_services: self.debugger.script_debug_services.clone(),
            log_tool: self.log_stream.tool.clone(),
            log_min_os_version: self.log_stream.min_os_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DebuggerSettings {
    /// Native debug helper started on the device instead of the application
    #[serde(default = "default_helper_executable")]
    pub helper_executable: String,

    /// Services enabled in the script debugger argument
    #[serde(default = "default_script_debug_services")]
    pub script_debug_services: Vec<String>,
}

impl Default for DebuggerSettings {
    fn default() -> Self {
        Self {
            helper_executable: default_helper_executable(),
            script_debug_services: default_script_debug_services(),
        }
    }
}

fn default_helper_executable() -> String {
    "pdebug".to_string()
}

fn default_script_debug_services() -> Vec<String> {
    ["DebugMessages", "QmlDebugger", "V8Debugger", "QmlInspector"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Candidate port range for debugger connections
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortSettings {
    #[serde(default = "default_range_start")]
    pub range_start: u16,

    #[serde(default = "default_range_end")]
    pub range_end: u16,
}

impl PortSettings {
    pub fn range(&self) -> RangeInclusive<u16> {
        self.range_start..=self.range_end
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
        }
    }
}

fn default_range_start() -> u16 {
    10000
}

fn default_range_end() -> u16 {
    10100
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogStreamSettings {
    /// Device log tool
    #[serde(default = "default_log_tool")]
    pub tool: String,

    /// The tool is probed for only on devices newer than this
    #[serde(default = "default_log_min_os_version")]
    pub min_os_version: OsVersion,
}

impl Default for LogStreamSettings {
    fn default() -> Self {
        Self {
            tool: default_log_tool(),
            min_os_version: default_log_min_os_version(),
        }
    }
}

fn default_log_tool() -> String {
    "slog2info".to_string()
}

fn default_log_min_os_version() -> OsVersion {
    OsVersion::new(6, 5, 0)
}

/// Settings for the local device
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceSettings {
    #[serde(default = "default_device_id")]
    pub id: String,

    /// OS version the local device reports
    #[serde(default = "default_device_os_version")]
    pub os_version: OsVersion,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            os_version: default_device_os_version(),
        }
    }
}

fn default_device_id() -> String {
    "localhost".to_string()
}

fn default_device_os_version() -> OsVersion {
    OsVersion::new(7, 0, 0)
}

/// What a session orchestrator needs from the settings
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSettings {
    pub helper_executable: String,
    pub script_debug_services: Vec<String>,
    pub log_tool: String,
    pub log_min_os_version: OsVersion,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Settings::default().debug_settings()
    }
}

/// A single run configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfiguration {
    /// Display name for this configuration
    pub name: String,

    /// Executable path on the target
    pub executable: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Attach the native debugger through the helper
    #[serde(default)]
    pub native_debugger: bool,

    /// Attach the script (QML/JS) debugger
    #[serde(default)]
    pub script_debugger: bool,
}

impl RunConfiguration {
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            arguments: Vec::new(),
            environment: BTreeMap::new(),
            working_directory: None,
            native_debugger: false,
            script_debugger: false,
        }
    }

    /// Snapshot of what to run
    pub fn runnable(&self) -> Runnable {
        Runnable {
            executable: self.executable.clone(),
            arguments: self.arguments.clone(),
            environment: self.environment.clone(),
            working_directory: self.working_directory.clone(),
        }
    }

    pub fn capabilities(&self) -> DebugCapabilities {
        DebugCapabilities {
            native: self.native_debugger,
            script: self.script_debugger,
        }
    }
}

/// Launch configurations file (.rdemon/launch.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LaunchFile {
    #[serde(default)]
    pub configurations: Vec<RunConfiguration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.debugger.helper_executable, "pdebug");
        assert_eq!(settings.ports.range(), 10000..=10100);
        assert_eq!(settings.log_stream.tool, "slog2info");
        assert_eq!(settings.log_stream.min_os_version, OsVersion::new(6, 5, 0));
        assert_eq!(settings.device.os_version, OsVersion::new(7, 0, 0));
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let toml = r#"
[ports]
range_start = 12000

[log_stream]
min_os_version = "7.1"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.ports.range(), 12000..=10100);
        assert_eq!(settings.log_stream.tool, "slog2info");
        assert_eq!(settings.log_stream.min_os_version, OsVersion::new(7, 1, 0));
        assert_eq!(settings.debugger, DebuggerSettings::default());
    }

    #[test]
    fn test_settings_rejects_bad_os_version() {
        let toml = r#"
[device]
os_version = "seven"
"#;
        assert!(toml::from_str::<Settings>(toml).is_err());
    }

    #[test]
    fn test_debug_settings_from_settings() {
        let mut settings = Settings::default();
        settings.debugger.script_debug_services = vec!["QmlDebugger".to_string()];
        let debug = settings.debug_settings();
        assert_eq!(debug.helper_executable, "pdebug");
        assert_eq!(debug.script_debug_services, vec!["QmlDebugger".to_string()]);
        assert_eq!(debug.log_min_os_version, OsVersion::new(6, 5, 0));
    }

    #[test]
    fn test_run_configuration_snapshot() {
        let toml = r#"
[[configurations]]
name = "Demo"
executable = "/apps/demo/bin/demo"
arguments = ["-platform", "qnx"]
working_directory = "/apps/demo"
script_debugger = true

[configurations.environment]
QT_DEBUG_PLUGINS = "1"
"#;
        let file: LaunchFile = toml::from_str(toml).unwrap();
        let config = &file.configurations[0];

        let runnable = config.runnable();
        assert_eq!(runnable.arguments, vec!["-platform", "qnx"]);
        assert_eq!(
            runnable.environment.get("QT_DEBUG_PLUGINS").map(String::as_str),
            Some("1")
        );
        assert_eq!(runnable.working_directory, Some(PathBuf::from("/apps/demo")));

        let caps = config.capabilities();
        assert!(!caps.native);
        assert!(caps.script);
    }
}
