//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use gatehouse::catalog::ErrorCatalog;
use gatehouse::guards::{DenylistGate, HoneypotGuard, NonceGuard, SubmitTimeGuard};
use gatehouse::pipeline::VerificationPipeline;
use gatehouse::remote::{HttpTransport, RemoteVerifier};
use gatehouse::store::RedisStore;
use gatehouse::token::TokenSigner;

use crate::config::AppConfig;

/// The production pipeline: Redis-backed records, reqwest transport
pub type Pipeline = VerificationPipeline<RedisStore, HttpTransport>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Redis connection manager (auto-reconnecting)
    pub redis: ConnectionManager,

    /// The verification pipeline
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Create new application state, connecting to Redis
    pub async fn new(config: AppConfig) -> Result<Self> {
        // Connect to Redis with connection manager (handles reconnection)
        let client = redis::Client::open(config.redis_url.as_str())
            .context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        let signer = TokenSigner::new(config.signing_secret.as_bytes())
            .context("Failed to build token signer")?;

        let nonce = NonceGuard::new(
            signer.clone(),
            config.nonce.lifetime_secs,
            config.nonce.enabled,
        );
        // The honeypot signer ignores the global nonce toggle: disabling
        // CSRF nonces must not disarm the honeypot anti-tamper signature
        let honeypot = HoneypotGuard::new(
            NonceGuard::new(signer.clone(), config.nonce.lifetime_secs, true),
            config.honeypot.enabled,
        );
        let submit_time = SubmitTimeGuard::new(
            signer,
            RedisStore::new(redis.clone()),
            config.submit_time.enabled,
            config.submit_time.min_submit_secs,
            config.submit_time.ttl_secs,
        );
        let denylist = DenylistGate::from_entries(config.denylist.iter().cloned());

        let catalog = Arc::new(ErrorCatalog::default());
        let transport =
            HttpTransport::new(config.http_timeout_secs).context("Failed to build transport")?;
        let remote = RemoteVerifier::new(transport, config.verify_url.clone(), catalog.clone());

        let pipeline = Arc::new(VerificationPipeline::new(
            config.secret_key.clone(),
            config.protection_enabled,
            catalog,
            nonce,
            honeypot,
            submit_time,
            denylist,
            remote,
        ));

        Ok(Self {
            config,
            redis,
            pipeline,
        })
    }
}
