//! Secret resolution for API keys and the store service key.
//!
//! Resolution order:
//! 1. Environment variable
//! 2. Config file (with warning)
//!
//! Lookups take an environment accessor so tests never touch the process
//! environment.

use crate::types::{GenerationConfig, StoreConfig};

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// A single secret with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// The generation credential pool as raw strings, with provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    /// Keys in pool order, trimmed, blanks removed.
    pub keys: Vec<String>,
    /// Where they came from. `None` when nothing was found.
    pub source: Option<SecretSource>,
}

impl ResolvedCredentials {
    /// Returns true if no key was found.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Split a delimited key list, trimming and dropping blanks.
pub fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read an environment variable, treating empty as unset.
pub fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the credential pool from the process environment.
pub fn resolve_credentials(config: &GenerationConfig) -> ResolvedCredentials {
    resolve_credentials_with(config, env_lookup)
}

/// Resolve the credential pool using `lookup` for environment access.
///
/// A set variable wins even if it holds only blanks; the file list is used
/// only when the variable is absent.
pub fn resolve_credentials_with<F>(config: &GenerationConfig, lookup: F) -> ResolvedCredentials
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(&config.credentials_env) {
        let keys = split_keys(&raw);
        let source = (!keys.is_empty()).then(|| SecretSource::EnvVar(config.credentials_env.clone()));
        return ResolvedCredentials { keys, source };
    }

    let keys: Vec<String> = config
        .api_keys
        .iter()
        .flat_map(|k| split_keys(k))
        .collect();
    let source = (!keys.is_empty()).then_some(SecretSource::ConfigFile);
    ResolvedCredentials { keys, source }
}

/// Resolve the store service key.
pub fn resolve_service_key(config: &StoreConfig) -> Option<ResolvedSecret> {
    resolve_service_key_with(config, env_lookup)
}

/// Resolve the store service key using `lookup` for environment access.
pub fn resolve_service_key_with<F>(config: &StoreConfig, lookup: F) -> Option<ResolvedSecret>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(&config.service_key_env) {
        return Some(ResolvedSecret {
            value: value.trim().to_string(),
            source: SecretSource::EnvVar(config.service_key_env.clone()),
        });
    }

    config
        .service_key
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

/// Resolve the store URL from config, then its environment variable.
pub fn resolve_store_url_with<F>(config: &StoreConfig, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    config
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| lookup(&config.url_env))
        .map(|u| u.trim().trim_end_matches('/').to_string())
}

/// Resolve the store URL from config or the process environment.
pub fn resolve_store_url(config: &StoreConfig) -> Option<String> {
    resolve_store_url_with(config, env_lookup)
}
