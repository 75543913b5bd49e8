//! Honeypot decoy field validation.
//!
//! Field contract: one randomized field named `hcap_hp_<random>` that
//! legitimate users never see or fill, plus a fixed sibling `hcap_hp_sig`
//! carrying a nonce minted against the randomized field name so bots
//! cannot strip or rename the decoy.

use palisade_common::Submission;
use palisade_common::constants::fields::{HP_PREFIX, HP_SIGNATURE};

use super::NonceGuard;

/// Validates the honeypot contract on a submission.
pub struct HoneypotGuard {
    enabled: bool,
    /// Signs field names; independent of the global nonce toggle
    signer: NonceGuard,
}

impl HoneypotGuard {
    pub fn new(signer: NonceGuard, enabled: bool) -> Self {
        Self { enabled, signer }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// First posted key matching the honeypot prefix, excluding the
    /// signature field itself. First match wins over posted order.
    pub fn locate_field_name<'a>(&self, submission: &'a Submission) -> Option<&'a str> {
        submission.find_first_key_matching(|k| k.starts_with(HP_PREFIX) && k != HP_SIGNATURE)
    }

    /// Mint a fresh randomized field name and its signature for the
    /// render side of the contract.
    pub fn render_fields(&self, session: Option<&str>) -> (String, String) {
        use rand::Rng;
        let name = format!("{HP_PREFIX}{:08x}", rand::rng().random::<u32>());
        let signature = self.signer.issue(&name, session.unwrap_or(""));
        (name, signature)
    }

    /// True means the submission passes the honeypot check.
    ///
    /// Disabled -> pass unconditionally. Enabled -> the field must exist,
    /// the signature must verify (enforced for authenticated sessions
    /// only, mirroring the nonce asymmetry), and the value must be empty
    /// after trimming.
    pub fn check(&self, submission: &Submission) -> bool {
        if !self.enabled {
            return true;
        }

        let Some(field_name) = self.locate_field_name(submission) else {
            tracing::debug!("honeypot field missing from submission");
            return false;
        };

        if let Some(session) = submission.session_id.as_deref() {
            let signature = submission.field(HP_SIGNATURE);
            if self
                .signer
                .verify(signature, Some(field_name), Some(session))
                .is_some()
            {
                tracing::warn!(field = field_name, "honeypot signature invalid");
                return false;
            }
        }

        let value = submission.field(field_name).unwrap_or("");
        value.trim().is_empty()
    }
}
