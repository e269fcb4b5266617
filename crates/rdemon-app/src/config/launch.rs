//! Run configurations (`.rdemon/launch.toml`)

use std::path::Path;

use rdemon_core::prelude::*;

use super::settings::RDEMON_DIR;
use super::types::{LaunchFile, RunConfiguration};

pub const LAUNCH_FILENAME: &str = "launch.toml";

/// Load run configurations from .rdemon/launch.toml
///
/// Returns an empty list if the file doesn't exist or can't be parsed.
pub fn load_launch_configs(project_path: &Path) -> Vec<RunConfiguration> {
    let launch_path = project_path.join(RDEMON_DIR).join(LAUNCH_FILENAME);

    if !launch_path.exists() {
        debug!("No launch file at {:?}", launch_path);
        return Vec::new();
    }

    let content = match std::fs::read_to_string(&launch_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {:?}: {}", launch_path, e);
            return Vec::new();
        }
    };

    match toml::from_str::<LaunchFile>(&content) {
        Ok(file) => {
            debug!(
                "Loaded {} run configurations from {:?}",
                file.configurations.len(),
                launch_path
            );
            file.configurations
        }
        Err(e) => {
            warn!("Failed to parse {:?}: {}", launch_path, e);
            Vec::new()
        }
    }
}

/// Find a configuration by name (case-sensitive)
pub fn find_config_by_name<'a>(
    configs: &'a [RunConfiguration],
    name: &str,
) -> Option<&'a RunConfiguration> {
    configs.iter().find(|c| c.name == name)
}

/// Like [`find_config_by_name`], but a missing name is an error listing
/// what is available.
pub fn require_config(configs: &[RunConfiguration], name: &str) -> Result<RunConfiguration> {
    find_config_by_name(configs, name).cloned().ok_or_else(|| {
        let available: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        Error::config(format!(
            "No run configuration named '{}' (available: {})",
            name,
            if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            }
        ))
    })
}
