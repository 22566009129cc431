//! Provider configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! work out of the box for development (an in-memory backend with caching).

use crate::error::{ConfigError, GungnirResult};

/// Default connection descriptor.
pub const DEFAULT_PROVIDER_URI: &str = "memory://default";

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

/// Settings for building a provider stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Connection descriptor, e.g. `memory://default` or `lmdb:///var/lib/gungnir`.
    pub uri: String,
    /// Whether the provider is wrapped in a cache.
    pub cache_enabled: bool,
    /// Whether the cache serializes operations per record.
    pub cache_serialize_per_record: bool,
    /// LMDB map size in megabytes (LMDB descriptors only).
    pub lmdb_max_size_mb: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_PROVIDER_URI.to_string(),
            cache_enabled: true,
            cache_serialize_per_record: false,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

impl ProviderConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GUNGNIR_PROVIDER_URI`: connection descriptor (default: `memory://default`)
    /// - `GUNGNIR_CACHE_ENABLED`: "true" or "false" (default: true)
    /// - `GUNGNIR_CACHE_SERIALIZE`: "true" or "false" (default: false)
    /// - `GUNGNIR_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    pub fn from_env() -> GungnirResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ProviderConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> GungnirResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let uri = lookup("GUNGNIR_PROVIDER_URI")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.uri);

        let cache_enabled = lookup("GUNGNIR_CACHE_ENABLED")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.cache_enabled);

        let cache_serialize_per_record = lookup("GUNGNIR_CACHE_SERIALIZE")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.cache_serialize_per_record);

        let lmdb_max_size_mb = match lookup("GUNGNIR_LMDB_MAX_SIZE_MB") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 && size.checked_mul(1024 * 1024).is_some() => size,
                Ok(size) if size > 0 => {
                    return Err(ConfigError::InvalidValue {
                        field: "GUNGNIR_LMDB_MAX_SIZE_MB".to_string(),
                        value: raw,
                        reason: "too large to express in bytes".to_string(),
                    }
                    .into())
                }
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "GUNGNIR_LMDB_MAX_SIZE_MB".to_string(),
                        value: raw,
                        reason: "must be a positive integer".to_string(),
                    }
                    .into())
                }
            },
            None => defaults.lmdb_max_size_mb,
        };

        Ok(Self {
            uri,
            cache_enabled,
            cache_serialize_per_record,
            lmdb_max_size_mb,
        })
    }

    /// Scheme part of the descriptor (`memory`, `lmdb`, ...).
    pub fn scheme(&self) -> Option<&str> {
        self.uri.split_once("://").map(|(scheme, _)| scheme)
    }
}
