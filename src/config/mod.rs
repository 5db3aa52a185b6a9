mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    DEFAULT_END_TOLERANCE_MS, DEFAULT_EXPIRED_REPLY_TTL_MS, LoggingSettings, MessagingSettings,
    PublicationSettings, Settings,
};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the messaging, publication and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("SWITCHYARD")
                .prefix_separator("__")
                .separator("__"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;
