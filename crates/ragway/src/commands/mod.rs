//! CLI command handlers.

pub mod config;
pub mod keys;
pub mod start;

use std::path::Path;

use anyhow::Result;
use ragway_config::{ConfigSource, LoadedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Configuration loaded at startup.
    pub loaded: LoadedConfig,
}

/// Load an explicit config file, or discover the layered config.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = explicit else {
        return Ok(ragway_config::load_config(None)?);
    };

    let config = ragway_config::load_config_file(path)?;
    config.validate()?;
    Ok(LoadedConfig {
        config,
        sources: vec![ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        }],
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let loaded = load(Some(&path)).unwrap();
        assert_eq!(loaded.config.server().port, 9100);
        assert_eq!(loaded.loaded_from(), vec![path.as_path()]);
    }

    #[test]
    fn test_load_explicit_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[retrieval]\nmatch_count = 0\n").unwrap();

        assert!(load(Some(&path)).is_err());
        assert!(load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
