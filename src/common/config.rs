//! # Configuration Utilities
//!
//! Shared configuration loading used by the relay and the client binaries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error, annotated with the path
///
/// # Example
/// ```ignore
/// let config: RelayConfig = load_config("config/relay.toml")?;
/// ```
pub fn load_config<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: T = toml::from_str(&content)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}
