//! Time-bucketed CSRF nonces.
//!
//! Nonce protection is a CSRF defense for logged-in sessions only:
//! anonymous submissions are exempt and rely on the CAPTCHA itself. That
//! asymmetry is deliberate.

use palisade_common::ErrorCode;

use crate::token::{TokenSigner, ct_eq};

/// Number of hex characters exposed as the nonce token
const NONCE_LEN: usize = 10;

/// Issues and verifies single-action nonces bound to a session.
///
/// A nonce is the first 10 hex chars of HMAC(secret, "tick|action|session")
/// where `tick = now / (lifetime / 2)`. Verification accepts the current
/// and the previous tick, so a nonce stays valid for one to two half-lives.
#[derive(Clone)]
pub struct NonceGuard {
    signer: TokenSigner,
    lifetime_secs: u64,
    enabled: bool,
}

impl NonceGuard {
    pub fn new(signer: TokenSigner, lifetime_secs: u64, enabled: bool) -> Self {
        Self {
            signer,
            lifetime_secs: lifetime_secs.max(2),
            enabled,
        }
    }

    fn tick(&self, now: i64) -> i64 {
        now / (self.lifetime_secs as i64 / 2)
    }

    fn token_for(&self, tick: i64, action: &str, session: &str) -> String {
        let mut hex = self.signer.mac_hex(&format!("{tick}|{action}|{session}"));
        hex.truncate(NONCE_LEN);
        hex
    }

    /// Mint a nonce for the current tick
    pub fn issue(&self, action: &str, session: &str) -> String {
        self.issue_at(action, session, chrono::Utc::now().timestamp())
    }

    pub(crate) fn issue_at(&self, action: &str, session: &str, now: i64) -> String {
        self.token_for(self.tick(now), action, session)
    }

    /// Verify a caller-supplied nonce. `None` means pass.
    ///
    /// Passes unconditionally when: both token and action are absent (the
    /// caller never asked for nonce protection), the session is anonymous,
    /// or nonce protection is globally disabled.
    pub fn verify(
        &self,
        token: Option<&str>,
        expected_action: Option<&str>,
        session: Option<&str>,
    ) -> Option<ErrorCode> {
        self.verify_at(token, expected_action, session, chrono::Utc::now().timestamp())
    }

    pub(crate) fn verify_at(
        &self,
        token: Option<&str>,
        expected_action: Option<&str>,
        session: Option<&str>,
        now: i64,
    ) -> Option<ErrorCode> {
        if token.is_none() && expected_action.is_none() {
            return None;
        }
        let Some(session) = session else {
            return None;
        };
        if !self.enabled {
            return None;
        }

        let (Some(token), Some(action)) = (token, expected_action) else {
            return Some(ErrorCode::BadNonce);
        };

        let tick = self.tick(now);
        for candidate in [tick, tick - 1] {
            let expected = self.token_for(candidate, action, session);
            if ct_eq(expected.as_bytes(), token.as_bytes()) {
                return None;
            }
        }

        tracing::debug!(action, "nonce verification failed");
        Some(ErrorCode::BadNonce)
    }
}
