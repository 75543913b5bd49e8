//! Remote CAPTCHA verification.
//!
//! POSTs `secret`, `response`, and (when known) `remoteip` to the
//! verification endpoint and folds the JSON reply into a
//! [`VerificationResult`] through the error catalog.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use palisade_common::{ErrorCode, GateError, VerificationResult};

use crate::catalog::ErrorCatalog;

/// Transport-level failure with a machine code carried into the result
#[derive(Debug, Clone)]
pub struct TransportError {
    pub code: &'static str,
    pub message: String,
}

/// Seam between the verifier and the actual HTTP client.
pub trait VerifyTransport: Send + Sync {
    /// POST a form body and return the raw response body
    fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Production transport over `reqwest` with a bounded timeout. The
/// original design had no timeout at all, which under a hung connection
/// means blocking indefinitely; a timeout here surfaces as a transport
/// failure like any other network trouble.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, GateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GateError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl VerifyTransport for HttpTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| TransportError {
                code: if e.is_timeout() {
                    "timeout"
                } else {
                    "http-request-failed"
                },
                message: e.to_string(),
            })?;

        response.text().await.map_err(|e| TransportError {
            code: "http-response-failed",
            message: e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Calls the external verification endpoint and types its outcome.
pub struct RemoteVerifier<T> {
    transport: T,
    endpoint: String,
    catalog: Arc<ErrorCatalog>,
}

impl<T: VerifyTransport> RemoteVerifier<T> {
    pub fn new(transport: T, endpoint: impl Into<String>, catalog: Arc<ErrorCatalog>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            catalog,
        }
    }

    fn generic_fail(&self) -> VerificationResult {
        VerificationResult::fail(
            self.catalog.message_for([&ErrorCode::Fail]),
            [ErrorCode::Fail],
        )
    }

    /// Verify a response token upstream.
    ///
    /// The raw token is sanitized here, exactly once, before it leaves
    /// the process; an empty token short-circuits without any network
    /// call, since the upstream answer is a foregone conclusion.
    pub async fn verify(
        &self,
        secret: &str,
        response_token: &str,
        caller_ip: Option<&str>,
    ) -> VerificationResult {
        let token = sanitize_token(response_token);
        if token.trim().is_empty() {
            return VerificationResult::fail(
                self.catalog.message_for([&ErrorCode::Empty]),
                [ErrorCode::Empty],
            );
        }

        let mut form: Vec<(&str, &str)> = vec![("secret", secret), ("response", &token)];
        if let Some(ip) = caller_ip {
            form.push(("remoteip", ip));
        }

        let body = match self.transport.post_form(&self.endpoint, &form).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(code = e.code, error = %e.message, "remote verification transport failure");
                return VerificationResult::fail(
                    e.message,
                    [ErrorCode::Other(e.code.to_string())],
                );
            }
        };

        if body.trim().is_empty() {
            tracing::warn!("remote verification returned an empty body");
            return self.generic_fail();
        }

        let parsed: ApiResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "remote verification body is not valid JSON");
                return self.generic_fail();
            }
        };

        if parsed.success {
            return VerificationResult::pass();
        }

        let codes: Vec<ErrorCode> = parsed
            .error_codes
            .iter()
            .map(|code| ErrorCode::parse(code))
            .collect();
        let message = self.catalog.message_for(codes.iter());

        if message.is_empty() {
            // No code the catalog knows about; fall back to the generic
            // failure rather than showing nothing
            self.generic_fail()
        } else {
            VerificationResult::fail(message, codes)
        }
    }
}

/// HTML-entity-escape a response token before it leaves the process.
pub fn sanitize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::testing::StubTransport;
    use super::*;

    fn verifier(transport: StubTransport) -> RemoteVerifier<StubTransport> {
        RemoteVerifier::new(
            transport,
            "https://verify.example/siteverify",
            Arc::new(ErrorCatalog::default()),
        )
    }

    #[tokio::test]
    async fn success_true_passes_with_no_codes() {
        let verifier = verifier(StubTransport::replying(r#"{"success": true}"#));
        let result = verifier.verify("secret", "tok", None).await;
        assert!(result.success);
        assert!(result.codes.is_empty());
    }

    #[tokio::test]
    async fn known_error_codes_compose_through_the_catalog() {
        let verifier = verifier(StubTransport::replying(
            r#"{"success": false, "error-codes": ["invalid-input-response"]}"#,
        ));
        let result = verifier.verify("secret", "tok", None).await;
        assert!(!result.success);
        assert!(result.codes.contains(&ErrorCode::InvalidInputResponse));
        assert_eq!(
            result.message,
            "error: The response parameter (verification token) is invalid or malformed."
        );
    }

    #[tokio::test]
    async fn unknown_codes_fall_back_to_generic_fail() {
        let verifier = verifier(StubTransport::replying(
            r#"{"success": false, "error-codes": ["mystery-code"]}"#,
        ));
        let result = verifier.verify("secret", "tok", None).await;
        assert_eq!(result.codes.iter().collect::<Vec<_>>(), [&ErrorCode::Fail]);
    }

    #[tokio::test]
    async fn empty_body_is_a_generic_fail() {
        let verifier = verifier(StubTransport::replying("  "));
        let result = verifier.verify("secret", "tok", None).await;
        assert_eq!(result.codes.iter().collect::<Vec<_>>(), [&ErrorCode::Fail]);
    }

    #[tokio::test]
    async fn transport_error_carries_its_code_and_message() {
        let transport = StubTransport::failing();
        let verifier = verifier(transport.clone());
        let result = verifier.verify("secret", "tok", None).await;
        assert!(!result.success);
        assert_eq!(result.message, "connection refused");
        assert!(
            result
                .codes
                .contains(&ErrorCode::Other("http-request-failed".to_string()))
        );
    }

    #[tokio::test]
    async fn empty_token_short_circuits_without_network() {
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let verifier = verifier(transport.clone());
        let result = verifier.verify("secret", "   ", None).await;
        assert!(result.codes.contains(&ErrorCode::Empty));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn token_is_escaped_exactly_once_before_sending() {
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let verifier = verifier(transport.clone());
        verifier.verify("secret", "tok&en", None).await;
        assert_eq!(
            transport.last_field("response").as_deref(),
            Some("tok&amp;en")
        );
    }

    #[test]
    fn sanitize_escapes_html_entities() {
        assert_eq!(
            sanitize_token(r#"<tok&"x'>"#),
            "&lt;tok&amp;&quot;x&#039;&gt;"
        );
        assert_eq!(sanitize_token("  plain  "), "plain");
    }
}
