mod config;
mod preferences;

pub use config::{load_settings, save_settings, ProtectionSettings, DEFAULT_MAX_FILE_SIZE};
pub use preferences::{JsonFilePreferences, MemoryPreferences, Preferences};
