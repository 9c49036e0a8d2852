use std::path::Path;
use thiserror::Error;

use super::types::GatewayConfigFile;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("No enabled gateways in config")]
    NoEnabledGateways,
    #[error("Gateway not found: {0}")]
    GatewayNotFound(String),
}

/// Load gateway configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GatewayConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: GatewayConfigFile = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<GatewayConfigFile, ConfigError> {
    let config: GatewayConfigFile = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<GatewayConfigFile, ConfigError> {
    let default_config = include_str!("gateway_config.json");
    load_config_from_str(default_config)
}

impl GatewayConfigFile {
    /// Get only enabled gateways
    pub fn enabled_gateways(&self) -> Vec<&super::types::EndpointConfig> {
        self.gateways.iter().filter(|g| g.enabled).collect()
    }

    /// Get a specific gateway by ID
    pub fn get_gateway(&self, id: &str) -> Option<&super::types::EndpointConfig> {
        self.gateways.iter().find(|g| g.id == id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_gateways().is_empty() {
            return Err(ConfigError::NoEnabledGateways);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProtocolKind;

    #[test]
    fn test_load_default_config() {
        let config = load_default_config().unwrap();
        assert!(!config.gateways.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_enabled_gateways() {
        let config = load_default_config().unwrap();
        let enabled = config.enabled_gateways();
        assert!(enabled.iter().any(|g| g.id == "binance-spot"));
    }

    #[test]
    fn test_get_gateway() {
        let config = load_default_config().unwrap();
        let bitmex = config.get_gateway("bitmex").unwrap();
        assert_eq!(bitmex.protocol, ProtocolKind::FrameArray);
    }

    #[test]
    fn test_sections_layer_over_defaults() {
        let config = load_default_config().unwrap();
        let binance = config.get_gateway("binance-spot").unwrap();
        let runtime = binance.gateway_config();
        assert_eq!(runtime.rate_limit.capacity, 5);
        assert_eq!(runtime.rate_limit.window, std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_config_without_enabled_gateways() {
        let config = load_config_from_str(
            r#"{"gateways":[{"id":"x","name":"X","url":"wss://x","protocol":"envelope","enabled":false}]}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoEnabledGateways)
        ));
    }
}
