//! Configuration file paths

use std::path::PathBuf;

/// Name used for the platform config and data directories
const APP_NAME: &str = "contract-scenario";

/// Config file looked up in the working directory before the platform one
pub const LOCAL_CONFIG_FILE: &str = "scenario.toml";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/contract-scenario/`
/// - macOS: `~/Library/Application Support/contract-scenario/`
/// - Windows: `%APPDATA%\contract-scenario\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
