use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    // Open the configuration file
    let file = File::open(config_path)
        .wrap_err_with(|| {
            format!("Failed to open configuration file '{}'", config_path.display())
        })?;

    // Parse the YAML content
    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| {
            format!("Failed to parse configuration file '{}'", config_path.display())
        })?;

    // Validate the configuration
    config.validate()?;

    info!(
        "Loaded {} authorized blocks, quarantine block {}",
        config.authorized_blocks.len(),
        config.quarantine_block
    );

    Ok(config)
}
