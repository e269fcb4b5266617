//! Settings file loading (`.rdemon/config.toml`)

use std::path::Path;

use rdemon_core::prelude::*;

use super::types::Settings;

pub const RDEMON_DIR: &str = ".rdemon";
pub const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# Remote Demon Configuration

[debugger]
helper_executable = "pdebug"   # Native debug helper started on the device
script_debug_services = ["DebugMessages", "QmlDebugger", "V8Debugger", "QmlInspector"]

[ports]
range_start = 10000
range_end = 10100

[log_stream]
tool = "slog2info"
min_os_version = "6.5.0"       # Probe for the tool only on newer devices

[device]
id = "localhost"
os_version = "7.0.0"           # Reported by the local device
"#;

/// Load settings from .rdemon/config.toml
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(RDEMON_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create the default config file in .rdemon/. Existing files are kept.
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let rdemon_dir = project_path.join(RDEMON_DIR);

    if !rdemon_dir.exists() {
        std::fs::create_dir_all(&rdemon_dir)
            .with_context(|| format!("Failed to create {:?}", rdemon_dir))?;
    }

    let config_path = rdemon_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG).context("Failed to write config.toml")?;
        info!("Created {:?}", config_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdemon_core::OsVersion;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_missing_file_uses_defaults() {
        let temp = tempdir().unwrap();
        assert_eq!(load_settings(temp.path()), Settings::default());
    }

    #[test]
    fn test_load_settings_malformed_file_uses_defaults() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(RDEMON_DIR)).unwrap();
        std::fs::write(
            temp.path().join(RDEMON_DIR).join(CONFIG_FILENAME),
            "[ports\nrange_start = ",
        )
        .unwrap();

        assert_eq!(load_settings(temp.path()), Settings::default());
    }

    #[test]
    fn test_load_settings_reads_values() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(RDEMON_DIR)).unwrap();
        std::fs::write(
            temp.path().join(RDEMON_DIR).join(CONFIG_FILENAME),
            "[device]\nos_version = \"6.4.1\"\n\n[debugger]\nhelper_executable = \"pdebug-ntox86\"\n",
        )
        .unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.device.os_version, OsVersion::new(6, 4, 1));
        assert_eq!(settings.debugger.helper_executable, "pdebug-ntox86");
        assert_eq!(settings.ports.range_start, 10000);
    }

    #[test]
    fn test_init_config_dir_creates_valid_file() {
        let temp = tempdir().unwrap();

        init_config_dir(temp.path()).unwrap();

        let content =
            std::fs::read_to_string(temp.path().join(RDEMON_DIR).join(CONFIG_FILENAME)).unwrap();
        let settings: Settings =
            toml::from_str(&content).expect("Default config should be valid TOML");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_init_config_dir_idempotent() {
        let temp = tempdir().unwrap();
        init_config_dir(temp.path()).unwrap();

        let config_path = temp.path().join(RDEMON_DIR).join(CONFIG_FILENAME);
        std::fs::write(&config_path, "[ports]\nrange_start = 20000\n").unwrap();

        init_config_dir(temp.path()).unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("range_start = 20000"));
    }
}
