//! Configuration system for the ragway gateway.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (user config dir + project-local overrides)
//! - Credential pool resolution from a comma-separated environment value,
//!   with a plaintext config fallback that raises a warning
//! - Range checks on the merged result

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{
    ResolvedCredentials, ResolvedSecret, SecretSource, env_lookup, resolve_credentials,
    resolve_credentials_with, resolve_service_key, resolve_service_key_with, resolve_store_url,
    resolve_store_url_with, split_keys,
};
pub use types::*;
