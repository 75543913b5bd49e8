//! Error code to display message catalog.

use std::collections::HashMap;

use palisade_common::ErrorCode;

/// Maps machine error codes (upstream API codes plus internal codes) to
/// one human-readable sentence each.
///
/// The table is overridable through [`ErrorCatalog::with_overrides`] so
/// deployments can reword or localize messages without forking.
#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    messages: HashMap<ErrorCode, String>,
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        let entries: &[(ErrorCode, &str)] = &[
            (
                ErrorCode::MissingInputSecret,
                "Your secret key is missing.",
            ),
            (
                ErrorCode::InvalidInputSecret,
                "Your secret key is invalid or malformed.",
            ),
            (
                ErrorCode::MissingInputResponse,
                "The response parameter (verification token) is missing.",
            ),
            (
                ErrorCode::InvalidInputResponse,
                "The response parameter (verification token) is invalid or malformed.",
            ),
            (
                ErrorCode::ExpiredInputResponse,
                "The response parameter has expired.",
            ),
            (
                ErrorCode::AlreadySeenResponse,
                "The response parameter has already been checked, or has another issue.",
            ),
            (ErrorCode::BadRequest, "The request is invalid or malformed."),
            (ErrorCode::MissingRemoteip, "The remoteip parameter is missing."),
            (
                ErrorCode::InvalidRemoteip,
                "The remoteip parameter is invalid or malformed.",
            ),
            (
                ErrorCode::NotUsingDummyPasscode,
                "You have used a testing sitekey but have not used its matching secret.",
            ),
            (
                ErrorCode::SitekeySecretMismatch,
                "The sitekey is not registered with the provided secret.",
            ),
            (ErrorCode::Empty, "Please complete the captcha."),
            (ErrorCode::Fail, "The captcha is invalid."),
            (ErrorCode::BadNonce, "Bad nonce."),
            (ErrorCode::BadSignature, "The token signature is invalid."),
            (ErrorCode::BadEncoding, "The token payload is malformed."),
            (ErrorCode::BadPayload, "The token payload is not valid."),
            (ErrorCode::Spam, "Spam submission detected."),
            (
                ErrorCode::ReplayedOrExpired,
                "The form token has already been used or has expired.",
            ),
            (ErrorCode::TooFast, "The form was submitted too quickly."),
            (ErrorCode::Expired, "The form token has expired."),
        ];

        Self {
            messages: entries
                .iter()
                .map(|(code, msg)| (code.clone(), (*msg).to_string()))
                .collect(),
        }
    }
}

impl ErrorCatalog {
    /// Merge caller-supplied entries over the default table. New codes are
    /// added, existing codes are replaced.
    pub fn with_overrides(
        mut self,
        overrides: impl IntoIterator<Item = (ErrorCode, String)>,
    ) -> Self {
        self.messages.extend(overrides);
        self
    }

    pub fn message(&self, code: &ErrorCode) -> Option<&str> {
        self.messages.get(code).map(String::as_str)
    }

    /// Compose one display message from a set of codes.
    ///
    /// Known messages are joined with `"; "` under a count-pluralized
    /// header. Unknown codes are silently dropped; a fully-unknown input
    /// yields the empty string.
    pub fn message_for<'a>(&self, codes: impl IntoIterator<Item = &'a ErrorCode>) -> String {
        let known: Vec<&str> = codes
            .into_iter()
            .filter_map(|code| self.message(code))
            .collect();

        if known.is_empty() {
            return String::new();
        }

        let header = if known.len() == 1 { "error:" } else { "errors:" };
        format!("{header} {}", known.join("; "))
    }
}
