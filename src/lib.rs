//! r-chimetts library core functionality

pub mod audio;
pub mod config;
pub mod device;
pub mod outcome;
pub mod player;
pub mod segment;
pub mod ui;

/// Initialize the application directories
pub fn init_app_dirs(settings: &config::Settings) -> std::io::Result<()> {
    if let Some(config_dir) = config::Settings::default_path().parent() {
        std::fs::create_dir_all(config_dir)?;
    }
    std::fs::create_dir_all(&settings.temp_dir)?;
    Ok(())
}
