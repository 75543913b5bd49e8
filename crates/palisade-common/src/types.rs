//! Core types shared across Palisade components.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize, Serializer};

/// Machine-readable failure reason.
///
/// Codes mirror the upstream verification API's `error-codes` strings plus
/// the internally-defined codes produced by the guards. Codes the upstream
/// API may add later are carried verbatim as [`ErrorCode::Other`] so they
/// survive the round trip even before the catalog learns about them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    // Upstream verification API codes
    MissingInputSecret,
    InvalidInputSecret,
    MissingInputResponse,
    InvalidInputResponse,
    ExpiredInputResponse,
    AlreadySeenResponse,
    BadRequest,
    MissingRemoteip,
    InvalidRemoteip,
    NotUsingDummyPasscode,
    SitekeySecretMismatch,

    // Internal codes
    /// Response token missing or blank
    Empty,
    /// Generic/unspecified failure (denylist hit, transport trouble, ...)
    Fail,
    /// CSRF nonce invalid (authenticated sessions only)
    BadNonce,
    /// Signed token HMAC mismatch
    BadSignature,
    /// Signed token payload not valid base64
    BadEncoding,
    /// Signed token payload decoded but is not a JSON object
    BadPayload,
    /// Honeypot tripped
    Spam,
    /// Submit-time record missing or already consumed
    ReplayedOrExpired,
    /// Form submitted faster than the minimum dwell time
    TooFast,
    /// Submit-time token past its TTL
    Expired,

    /// Unrecognized code passed through verbatim
    Other(String),
}

impl ErrorCode {
    /// Wire representation (kebab-case, matching the upstream API)
    pub fn as_str(&self) -> &str {
        match self {
            Self::MissingInputSecret => "missing-input-secret",
            Self::InvalidInputSecret => "invalid-input-secret",
            Self::MissingInputResponse => "missing-input-response",
            Self::InvalidInputResponse => "invalid-input-response",
            Self::ExpiredInputResponse => "expired-input-response",
            Self::AlreadySeenResponse => "already-seen-response",
            Self::BadRequest => "bad-request",
            Self::MissingRemoteip => "missing-remoteip",
            Self::InvalidRemoteip => "invalid-remoteip",
            Self::NotUsingDummyPasscode => "not-using-dummy-passcode",
            Self::SitekeySecretMismatch => "sitekey-secret-mismatch",
            Self::Empty => "empty",
            Self::Fail => "fail",
            Self::BadNonce => "bad-nonce",
            Self::BadSignature => "bad-signature",
            Self::BadEncoding => "bad-encoding",
            Self::BadPayload => "bad-payload",
            Self::Spam => "spam",
            Self::ReplayedOrExpired => "replayed-or-expired",
            Self::TooFast => "too-fast",
            Self::Expired => "expired",
            Self::Other(code) => code,
        }
    }

    /// Parse a wire code; unknown strings are carried as [`ErrorCode::Other`]
    pub fn parse(code: &str) -> Self {
        match code {
            "missing-input-secret" => Self::MissingInputSecret,
            "invalid-input-secret" => Self::InvalidInputSecret,
            "missing-input-response" => Self::MissingInputResponse,
            "invalid-input-response" => Self::InvalidInputResponse,
            "expired-input-response" => Self::ExpiredInputResponse,
            "already-seen-response" => Self::AlreadySeenResponse,
            "bad-request" => Self::BadRequest,
            "missing-remoteip" => Self::MissingRemoteip,
            "invalid-remoteip" => Self::InvalidRemoteip,
            "not-using-dummy-passcode" => Self::NotUsingDummyPasscode,
            "sitekey-secret-mismatch" => Self::SitekeySecretMismatch,
            "empty" => Self::Empty,
            "fail" => Self::Fail,
            "bad-nonce" => Self::BadNonce,
            "bad-signature" => Self::BadSignature,
            "bad-encoding" => Self::BadEncoding,
            "bad-payload" => Self::BadPayload,
            "spam" => Self::Spam,
            "replayed-or-expired" => Self::ReplayedOrExpired,
            "too-fast" => Self::TooFast,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::parse(&code))
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline's final decision for one submission.
///
/// Invariant: `codes` is empty iff `success` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,

    /// Human-readable message (empty on success)
    pub message: String,

    /// Machine-readable failure reasons (empty on success)
    pub codes: BTreeSet<ErrorCode>,
}

impl VerificationResult {
    /// A successful verification - no message, no codes
    pub fn pass() -> Self {
        Self {
            success: true,
            message: String::new(),
            codes: BTreeSet::new(),
        }
    }

    /// A failed verification with a display message and at least one code
    pub fn fail(message: impl Into<String>, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        Self {
            success: false,
            message: message.into(),
            codes: codes.into_iter().collect(),
        }
    }

    /// HTML-decorated message for direct display in forms: the header
    /// (everything up to and including the first `:`) is wrapped in
    /// `<strong>`.
    pub fn html_message(&self) -> String {
        match self.message.find(':') {
            Some(idx) => {
                let (header, rest) = self.message.split_at(idx + 1);
                format!("<strong>{header}</strong>{rest}")
            }
            None => self.message.clone(),
        }
    }
}

/// One form's posted verification-relevant fields.
///
/// Constructed fresh per HTTP request from raw POST data; never persisted.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// The CAPTCHA widget's proof-of-solve token
    pub response_token: Option<String>,

    /// Name of the posted field holding the CSRF nonce; `None` means the
    /// caller never asked for nonce protection
    pub nonce_field_name: Option<String>,

    /// Expected nonce action
    pub nonce_action: Option<String>,

    /// Authenticated session identifier; `None` means anonymous
    pub session_id: Option<String>,

    /// Caller IP, if known
    pub remote_ip: Option<String>,

    /// Raw posted fields in posted order. Order matters: honeypot field
    /// discovery is first-match-wins over these keys.
    pub fields: Vec<(String, String)>,
}

impl Submission {
    /// Convenience constructor for callers that hand over raw POST data:
    /// the response token is read from the standard widget field, no nonce
    /// check is requested.
    pub fn from_posted_fields(
        fields: Vec<(String, String)>,
        remote_ip: Option<String>,
        session_id: Option<String>,
    ) -> Self {
        let response_token = fields
            .iter()
            .find(|(k, _)| k == crate::constants::fields::RESPONSE)
            .map(|(_, v)| v.clone());
        Self {
            response_token,
            nonce_field_name: None,
            nonce_action: None,
            session_id,
            remote_ip,
            fields,
        }
    }

    /// Look up a posted field by exact name (first occurrence)
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First posted field name matching the predicate
    pub fn find_first_key_matching(&self, predicate: impl Fn(&str) -> bool) -> Option<&str> {
        self.fields
            .iter()
            .map(|(k, _)| k.as_str())
            .find(|k| predicate(k))
    }
}
