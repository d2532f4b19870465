//! Path utilities and file system helpers

use std::path::PathBuf;

/// Environment variable that relocates the whole application directory
pub const HOME_ENV: &str = "DESK_PET_HOME";

/// Environment variable that points at a directory of animation GIFs
pub const ASSETS_ENV: &str = "DESK_PET_ASSETS";

/// Gets the application data directory
pub fn get_app_data_dir() -> Result<PathBuf, String> {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    dirs::data_dir()
        .map(|p| p.join("com.deskpet.app"))
        .ok_or_else(|| "Could not find app data directory".to_string())
}

/// Gets the directory holding provider and pet configuration records
pub fn get_config_dir() -> Result<PathBuf, String> {
    get_app_data_dir().map(|p| p.join("config"))
}

/// Gets the directory holding the animation resources
pub fn get_assets_dir() -> Result<PathBuf, String> {
    if let Some(assets) = std::env::var_os(ASSETS_ENV) {
        return Ok(PathBuf::from(assets));
    }
    get_app_data_dir().map(|p| p.join("assets"))
}

/// Gets the greeting lines file path
pub fn get_greetings_path() -> Result<PathBuf, String> {
    get_config_dir().map(|p| p.join("talk.txt"))
}

/// Gets the log file path
pub fn get_log_path() -> Result<PathBuf, String> {
    get_app_data_dir().map(|p| p.join("logs").join("desk-pet.log"))
}
