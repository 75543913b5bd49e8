//! Minimum form-submit-time proof.
//!
//! A signed token is issued when the form renders and echoed back on
//! submission. The token proves that at least the configured dwell time
//! elapsed between render and submit; a single-use server-side record
//! keyed by the token's signature defends against replay.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use palisade_common::constants::{MIN_FST_TTL_SECS, store_keys::FST_PREFIX};
use palisade_common::{ErrorCode, GateError};

use crate::store::SingleUseStore;
use crate::token::TokenSigner;

/// Hook that may rewrite the final token string at issuance
pub type TokenFilter = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Signed proof payload carried by the submit-time token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitProof {
    /// Form context (post id or equivalent) the token was issued for
    pub context_id: String,
    /// Unix timestamp of issuance
    pub issued_at: i64,
    /// Record lifetime; floored to 60 seconds at issuance
    pub ttl_secs: u64,
}

/// Issues and verifies submit-time tokens.
pub struct SubmitTimeGuard<S> {
    signer: TokenSigner,
    store: S,
    enabled: bool,
    min_submit_secs: u64,
    ttl_secs: u64,
    token_filter: Option<TokenFilter>,
}

impl<S: SingleUseStore> SubmitTimeGuard<S> {
    pub fn new(
        signer: TokenSigner,
        store: S,
        enabled: bool,
        min_submit_secs: u64,
        ttl_secs: u64,
    ) -> Self {
        Self {
            signer,
            store,
            enabled,
            min_submit_secs,
            ttl_secs,
            token_filter: None,
        }
    }

    /// Install a hook that may rewrite the issued token string
    pub fn with_token_filter(mut self, filter: TokenFilter) -> Self {
        self.token_filter = Some(filter);
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Issue a signed proof for one form render and persist its
    /// single-use record.
    pub async fn issue(&self, context_id: &str) -> Result<String, GateError> {
        self.issue_at(context_id, chrono::Utc::now().timestamp())
            .await
    }

    pub(crate) async fn issue_at(&self, context_id: &str, now: i64) -> Result<String, GateError> {
        let ttl_secs = self.ttl_secs.max(MIN_FST_TTL_SECS);
        let proof = SubmitProof {
            context_id: context_id.to_string(),
            issued_at: now,
            ttl_secs,
        };

        let token = self.signer.create(&proof)?;
        let (encoded, signature) = TokenSigner::parse(&token);

        // Store exactly the bytes the token will decode to, so the
        // verify-time comparison can be byte-for-byte.
        let payload = STANDARD
            .decode(encoded)
            .map_err(|e| GateError::Token(format!("issued token not decodable: {e}")))?;
        let payload = String::from_utf8(payload)
            .map_err(|e| GateError::Token(format!("issued payload not utf-8: {e}")))?;

        self.store
            .put(&format!("{FST_PREFIX}{signature}"), &payload, ttl_secs)
            .await?;

        tracing::debug!(context_id, ttl_secs, "issued submit-time token");

        Ok(match &self.token_filter {
            Some(filter) => filter(token),
            None => token,
        })
    }

    /// Verify an echoed token. `Ok(None)` means pass.
    ///
    /// Failure order: token integrity, single-use record presence and
    /// byte-for-byte match, minimum dwell time, TTL. The record is deleted
    /// on success when `delete_on_success` is set, which is what prevents
    /// replay.
    pub async fn verify(
        &self,
        token: &str,
        delete_on_success: bool,
    ) -> Result<Option<ErrorCode>, GateError> {
        self.verify_at(token, delete_on_success, chrono::Utc::now().timestamp())
            .await
    }

    pub(crate) async fn verify_at(
        &self,
        token: &str,
        delete_on_success: bool,
        now: i64,
    ) -> Result<Option<ErrorCode>, GateError> {
        if !self.enabled {
            return Ok(None);
        }

        let raw = match self.signer.verify_raw(token) {
            Ok(raw) => raw,
            Err(e) => return Ok(Some(e.code())),
        };

        let (_, signature) = TokenSigner::parse(token);
        let key = format!("{FST_PREFIX}{signature}");

        match self.store.get(&key).await? {
            Some(stored) if stored.as_bytes() == raw.as_slice() => {}
            Some(_) => {
                tracing::warn!("submit-time record does not match token payload");
                return Ok(Some(ErrorCode::ReplayedOrExpired));
            }
            None => return Ok(Some(ErrorCode::ReplayedOrExpired)),
        }

        let proof: SubmitProof = match serde_json::from_slice(&raw) {
            Ok(proof) => proof,
            Err(_) => return Ok(Some(ErrorCode::BadPayload)),
        };

        let elapsed = now - proof.issued_at;
        if elapsed < self.min_submit_secs as i64 {
            tracing::debug!(elapsed, min = self.min_submit_secs, "form submitted too fast");
            return Ok(Some(ErrorCode::TooFast));
        }
        if elapsed > proof.ttl_secs as i64 {
            return Ok(Some(ErrorCode::Expired));
        }

        if delete_on_success {
            self.store.remove(&key).await?;
        }

        Ok(None)
    }
}
