/// `load_config` module: reads the optional YAML pipeline config into [`PipelineConfig`].
///
/// Every field has a default matching the mozjs setup, so a missing `--config`
/// yields the stock pipeline and a config file only needs the keys it overrides.
///
/// # Errors
/// Read, parse and validation failures surface as `anyhow::Error` at the CLI boundary.
use anyhow::{Context, Result};
use sm_bump_core::config::PipelineConfig;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Load the pipeline config from `path`, or the defaults when no path is given.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<PipelineConfig> {
    let config = match path {
        None => {
            info!("No config file given, using default pipeline configuration");
            PipelineConfig::default()
        }
        Some(path) => read_config_file(path.as_ref())?,
    };

    config.validate().map_err(|e| {
        error!(error = %e, "Pipeline configuration is invalid");
        anyhow::Error::new(e)
    })?;
    config.trace_loaded();
    Ok(config)
}

fn read_config_file(path_ref: &Path) -> Result<PipelineConfig> {
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty document deserialises to `null`; treat it as "all defaults".
    if config_content.trim().is_empty() {
        return Ok(PipelineConfig::default());
    }

    serde_yaml::from_str(&config_content)
        .map(|conf| {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        })
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            e
        })
        .with_context(|| format!("Failed to parse config YAML {:?}", path_ref))
}
