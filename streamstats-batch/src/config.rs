use streamstats_config::shared::BatchConfig;
use streamstats_config::{LoadConfigError, load_config};
use tracing::info;

use crate::error::{BatchError, BatchResult};

/// Loads and validates the batch configuration.
///
/// Without a `configuration/` directory in the working directory the built-in defaults are
/// used, so the tool runs out of the box against the public services.
pub fn load_batch_config() -> BatchResult<BatchConfig> {
    let config = match load_config::<BatchConfig>() {
        Ok(config) => config,
        Err(LoadConfigError::MissingConfigurationDirectory(directory)) => {
            info!(
                directory = %directory.display(),
                "no configuration directory found, using defaults"
            );
            BatchConfig::default()
        }
        Err(err) => return Err(BatchError::config(err)),
    };

    config.validate().map_err(BatchError::config)?;

    Ok(config)
}
