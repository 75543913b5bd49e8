//! Configuration management for Gatehouse.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use palisade_common::constants::{
    DEFAULT_FST_TTL_SECS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_MIN_SUBMIT_SECS,
    DEFAULT_NONCE_LIFETIME_SECS, DEFAULT_REDIS_URL, DEFAULT_VERIFY_URL,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Secret key for the remote verification API
    #[serde(default)]
    pub secret_key: String,

    /// Signing secret for tokens and nonces; falls back to the API secret
    /// key when unset
    #[serde(default)]
    pub signing_secret: String,

    /// Remote verification endpoint URL
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Remote call timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Master toggle: when off, every submission passes
    #[serde(default = "default_true")]
    pub protection_enabled: bool,

    /// Denylisted caller IPs
    #[serde(default)]
    pub denylist: Vec<String>,

    /// Nonce (CSRF) configuration
    #[serde(default)]
    pub nonce: NonceConfig,

    /// Honeypot configuration
    #[serde(default)]
    pub honeypot: HoneypotConfig,

    /// Minimum-submit-time configuration
    #[serde(default)]
    pub submit_time: SubmitTimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NonceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nonce lifetime in seconds
    #[serde(default = "default_nonce_lifetime")]
    pub lifetime_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            lifetime_secs: default_nonce_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoneypotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTimeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum dwell time between render and submit
    #[serde(default = "default_min_submit")]
    pub min_submit_secs: u64,

    /// Token and single-use record TTL (floored to 60 at issuance)
    #[serde(default = "default_fst_ttl")]
    pub ttl_secs: u64,
}

impl Default for SubmitTimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_submit_secs: default_min_submit(),
            ttl_secs: default_fst_ttl(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_verify_url() -> String { DEFAULT_VERIFY_URL.to_string() }
fn default_http_timeout() -> u64 { DEFAULT_HTTP_TIMEOUT_SECS }
fn default_nonce_lifetime() -> u64 { DEFAULT_NONCE_LIFETIME_SECS }
fn default_min_submit() -> u64 { DEFAULT_MIN_SUBMIT_SECS }
fn default_fst_ttl() -> u64 { DEFAULT_FST_TTL_SECS }
fn default_true() -> bool { true }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref secret) = args.secret_key {
            config.secret_key = secret.clone();
        }

        if config.secret_key.is_empty() {
            anyhow::bail!("secret_key must be set (config file or --secret-key / PALISADE_SECRET)");
        }
        if config.signing_secret.is_empty() {
            config.signing_secret = config.secret_key.clone();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            secret_key: String::new(),
            signing_secret: String::new(),
            verify_url: default_verify_url(),
            http_timeout_secs: default_http_timeout(),
            protection_enabled: true,
            denylist: Vec::new(),
            nonce: NonceConfig::default(),
            honeypot: HoneypotConfig::default(),
            submit_time: SubmitTimeConfig::default(),
        }
    }
}
