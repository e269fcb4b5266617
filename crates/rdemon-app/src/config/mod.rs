//! Configuration file parsing for Remote Demon
//!
//! Supports:
//! - `.rdemon/config.toml` - Orchestrator settings
//! - `.rdemon/launch.toml` - Run configurations

pub mod launch;
pub mod settings;
pub mod types;

pub use launch::{find_config_by_name, load_launch_configs, require_config, LAUNCH_FILENAME};
pub use settings::{init_config_dir, load_settings, CONFIG_FILENAME, RDEMON_DIR};
pub use types::*;
