use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::queries::Dialect;

pub const DEFAULT_DESCRIPTOR_ENV: &str = "JDBCURL";

/// What a cache hit is worth.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Cached identities are returned without checking the supplied secret.
    #[default]
    TrustCached,
    /// Every call re-verifies against the remote source.
    Reverify,
    /// Trust entries younger than `ttl_secs`, re-verify older ones.
    Ttl { ttl_secs: u64 },
}

impl CachePolicy {
    /// Whether an entry of the given age may be returned as-is.
    pub fn trusts(&self, age: Duration) -> bool {
        match self {
            CachePolicy::TrustCached => true,
            CachePolicy::Reverify => false,
            CachePolicy::Ttl { ttl_secs } => age < Duration::from_secs(*ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RealmConfig {
    /// Explicit descriptor; wins over the environment.
    pub descriptor: Option<String>,
    pub descriptor_env_var: String,
    pub dialect: Dialect,
    pub cache_policy: CachePolicy,
    pub connect_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            descriptor: None,
            descriptor_env_var: DEFAULT_DESCRIPTOR_ENV.to_string(),
            dialect: Dialect::default(),
            cache_policy: CachePolicy::default(),
            connect_timeout_ms: 10_000,
            query_timeout_ms: 30_000,
        }
    }
}

fn lookup_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    match lookup(name) {
        Some(v) => Ok(Some(v.trim().parse::<u64>().with_context(|| format!("{} must be an integer, got '{}'", name, v))?)),
        None => Ok(None),
    }
}

impl RealmConfig {
    pub fn with_descriptor<S: Into<String>>(mut self, descriptor: S) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid realm config json")
    }

    /// Overlay `SQLREALM_*` environment variables on the defaults.
    /// The descriptor itself is not read here; the realm reads `descriptor_env_var` lazily.
    pub fn from_env() -> Result<Self> { Self::from_lookup(|name| std::env::var(name).ok()) }

    /// `from_env` over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SQLREALM_DESCRIPTOR_ENV") {
            if !v.trim().is_empty() { cfg.descriptor_env_var = v.trim().to_string(); }
        }
        if let Some(v) = lookup("SQLREALM_DIALECT") {
            cfg.dialect = v.parse::<Dialect>().map_err(anyhow::Error::msg)?;
        }
        if let Some(ttl) = lookup_u64(&lookup, "SQLREALM_CACHE_TTL_SECS")? {
            cfg.cache_policy = if ttl == 0 { CachePolicy::Reverify } else { CachePolicy::Ttl { ttl_secs: ttl } };
        }
        if let Some(ms) = lookup_u64(&lookup, "SQLREALM_CONNECT_TIMEOUT_MS")? { cfg.connect_timeout_ms = ms; }
        if let Some(ms) = lookup_u64(&lookup, "SQLREALM_QUERY_TIMEOUT_MS")? { cfg.query_timeout_ms = ms; }
        Ok(cfg)
    }

    pub fn connect_timeout(&self) -> Duration { Duration::from_millis(self.connect_timeout_ms) }
    pub fn query_timeout(&self) -> Duration { Duration::from_millis(self.query_timeout_ms) }
}
