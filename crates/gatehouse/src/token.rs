//! Signed token creation and validation.
//!
//! Tokens are `base64(json_payload) + "-" + hmac_sha256_hex(base64_payload)`.
//! The standard (not URL-safe) base64 alphabet is mandated everywhere a
//! token is produced or consumed: it contains no `-`, so splitting on the
//! first dash is unambiguous.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use palisade_common::{ErrorCode, GateError};

type HmacSha256 = Hmac<Sha256>;

/// Token integrity failures. Any mismatch invalidates the whole token,
/// there is no partial trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature mismatch")]
    BadSignature,

    #[error("token payload is not valid base64")]
    BadEncoding,

    #[error("token payload is not a JSON object")]
    BadPayload,
}

impl TokenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadSignature => ErrorCode::BadSignature,
            Self::BadEncoding => ErrorCode::BadEncoding,
            Self::BadPayload => ErrorCode::BadPayload,
        }
    }
}

/// Creates and validates signed tokens under one server-wide secret.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self, GateError> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| GateError::Config(format!("invalid signing secret: {e}")))?;
        Ok(Self { mac })
    }

    /// Lowercase-hex HMAC of an arbitrary message. Also used by the nonce
    /// scheme, so nonces and tokens share one secret.
    pub(crate) fn mac_hex(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        to_hex(&mac.finalize().into_bytes())
    }

    /// Serialize and sign a payload: `base64(json) + "-" + signature`
    pub fn create<P: Serialize>(&self, payload: &P) -> Result<String, GateError> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| GateError::Token(format!("payload serialization failed: {e}")))?;
        let encoded = STANDARD.encode(json);
        let signature = self.mac_hex(&encoded);
        Ok(format!("{encoded}-{signature}"))
    }

    /// Split a token into (encoded payload, signature). Everything after
    /// the first `-` is the signature.
    pub fn parse(token: &str) -> (&str, &str) {
        token.split_once('-').unwrap_or((token, ""))
    }

    /// Validate a token and return the raw decoded payload bytes.
    ///
    /// Signature is checked first, through the MAC's own constant-time
    /// verifier, then base64, then the payload must parse to a JSON
    /// object.
    pub fn verify_raw(&self, token: &str) -> Result<Vec<u8>, TokenError> {
        let (encoded, signature) = Self::parse(token);

        let sig_bytes = from_hex(signature).ok_or(TokenError::BadSignature)?;
        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&sig_bytes)
            .map_err(|_| TokenError::BadSignature)?;

        let raw = STANDARD.decode(encoded).map_err(|_| TokenError::BadEncoding)?;

        let value: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|_| TokenError::BadPayload)?;
        if !value.is_object() {
            return Err(TokenError::BadPayload);
        }

        Ok(raw)
    }

    /// Validate a token and return the payload as a JSON object.
    pub fn verify(&self, token: &str) -> Result<serde_json::Value, TokenError> {
        let raw = self.verify_raw(token)?;
        serde_json::from_slice(&raw).map_err(|_| TokenError::BadPayload)
    }
}

/// Constant-time byte comparison for the truncated nonce form, which
/// cannot go through `Mac::verify_slice`. Length mismatch returns early;
/// lengths are not secret here, the compared bytes are.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret").unwrap()
    }

    #[test]
    fn round_trip_preserves_payload() {
        let signer = signer();
        let payload = json!({"context_id": "42", "issued_at": 1_700_000_000, "ttl_secs": 300});
        let token = signer.create(&payload).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), payload);
    }

    #[test]
    fn any_single_byte_mutation_is_rejected() {
        let signer = signer();
        let token = signer.create(&json!({"k": "v"})).unwrap();

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            if mutated == token {
                continue;
            }
            assert!(
                signer.verify(&mutated).is_err(),
                "mutation at byte {i} produced a valid token"
            );
        }
    }

    #[test]
    fn token_without_dash_fails_signature() {
        let signer = signer();
        assert_eq!(
            signer.verify("bm8tZGFzaA=="),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let signer = signer();
        let token = signer.create(&json!({"k": "v"})).unwrap();
        let (encoded, _) = TokenSigner::parse(&token);

        for signature in ["zz", "abc", "aé", ""] {
            assert_eq!(
                signer.verify(&format!("{encoded}-{signature}")),
                Err(TokenError::BadSignature),
                "signature {signature:?} must not verify"
            );
        }
    }

    #[test]
    fn signature_over_garbage_base64_fails_encoding() {
        let signer = signer();
        let encoded = "!!!notbase64!!!";
        let token = format!("{encoded}-{}", signer.mac_hex(encoded));
        // Signature is valid for the string, so the failure is the encoding
        assert_eq!(signer.verify(&token), Err(TokenError::BadEncoding));
    }

    #[test]
    fn non_object_payload_fails() {
        let signer = signer();
        let encoded = STANDARD.encode(b"42");
        let token = format!("{encoded}-{}", signer.mac_hex(&encoded));
        assert_eq!(signer.verify(&token), Err(TokenError::BadPayload));
    }

    #[test]
    fn wrong_secret_cannot_forge() {
        let token = signer().create(&json!({"k": "v"})).unwrap();
        let other = TokenSigner::new(b"other-secret").unwrap();
        assert_eq!(other.verify(&token), Err(TokenError::BadSignature));
    }
}
