//! The request verification pipeline.
//!
//! Composes the guards, the denylist gate, and the remote verifier into
//! one entry point with strict ordering and at-most-once semantics: one
//! HTTP request resolves exactly one verification, no matter how many
//! collaborators ask, and the remote endpoint is called at most once.

use std::sync::Arc;

use palisade_common::constants::fields::FST_TOKEN;
use palisade_common::{ErrorCode, Submission, VerificationResult};

use crate::catalog::ErrorCatalog;
use crate::guards::{DenylistGate, HoneypotGuard, NonceGuard, SubmitTimeGuard};
use crate::remote::{RemoteVerifier, VerifyTransport};
use crate::store::SingleUseStore;

/// Hook that receives the honeypot's computed boolean and may replace it
pub type HoneypotOverride = Arc<dyn Fn(bool, &Submission) -> bool + Send + Sync>;

/// Hook that sees every resolved result before it is cached and returned
pub type ResultInterceptor = Arc<dyn Fn(VerificationResult) -> VerificationResult + Send + Sync>;

/// Per-request verification state.
///
/// Created at request start, discarded at request end; never shared
/// across requests or processes. The cached result is what makes repeat
/// `verify` calls within one request free.
#[derive(Debug, Default)]
pub struct RequestContext {
    resolved: Option<VerificationResult>,
    in_progress: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved result, if this request already verified
    pub fn result(&self) -> Option<&VerificationResult> {
        self.resolved.as_ref()
    }
}

/// Orchestrates one verification per request context.
pub struct VerificationPipeline<S, T> {
    secret: String,
    protection_enabled: bool,
    catalog: Arc<ErrorCatalog>,
    nonce: NonceGuard,
    honeypot: HoneypotGuard,
    submit_time: SubmitTimeGuard<S>,
    denylist: DenylistGate,
    remote: RemoteVerifier<T>,
    honeypot_override: Option<HoneypotOverride>,
    interceptor: Option<ResultInterceptor>,
}

impl<S: SingleUseStore, T: VerifyTransport> VerificationPipeline<S, T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        secret: impl Into<String>,
        protection_enabled: bool,
        catalog: Arc<ErrorCatalog>,
        nonce: NonceGuard,
        honeypot: HoneypotGuard,
        submit_time: SubmitTimeGuard<S>,
        denylist: DenylistGate,
        remote: RemoteVerifier<T>,
    ) -> Self {
        Self {
            secret: secret.into(),
            protection_enabled,
            catalog,
            nonce,
            honeypot,
            submit_time,
            denylist,
            remote,
            honeypot_override: None,
            interceptor: None,
        }
    }

    /// Install the honeypot override hook
    pub fn with_honeypot_override(mut self, hook: HoneypotOverride) -> Self {
        self.honeypot_override = Some(hook);
        self
    }

    /// Install the result interceptor hook
    pub fn with_result_interceptor(mut self, hook: ResultInterceptor) -> Self {
        self.interceptor = Some(hook);
        self
    }

    pub fn honeypot(&self) -> &HoneypotGuard {
        &self.honeypot
    }

    /// Issue a submit-time token for one form render
    pub async fn issue_submit_token(
        &self,
        context_id: &str,
    ) -> Result<String, palisade_common::GateError> {
        self.submit_time.issue(context_id).await
    }

    fn fail_with(&self, code: ErrorCode) -> VerificationResult {
        VerificationResult::fail(self.catalog.message_for([&code]), [code])
    }

    /// Route a resolved result through the interceptor, cache it in the
    /// context, and return it. Every resolving step funnels through here
    /// so the interceptor sees every code path uniformly.
    fn resolve(&self, ctx: &mut RequestContext, result: VerificationResult) -> VerificationResult {
        let result = match &self.interceptor {
            Some(hook) => hook(result),
            None => result,
        };
        ctx.in_progress = false;
        ctx.resolved = Some(result.clone());
        result
    }

    /// Verify one submission, resolving at most once per request context.
    pub async fn verify(
        &self,
        ctx: &mut RequestContext,
        submission: &Submission,
    ) -> VerificationResult {
        // At-most-once: a request that already resolved returns the cached
        // result unchanged, even if the inputs differ
        if let Some(resolved) = &ctx.resolved {
            return resolved.clone();
        }
        // Re-entrancy guard: a hook triggering a nested verify must not
        // cause a second remote call
        if ctx.in_progress {
            tracing::warn!("re-entrant verification attempt rejected");
            return self.fail_with(ErrorCode::Fail);
        }

        // Nonce failures return directly: they do not resolve the request
        // and do not pass through the result interceptor
        if submission.nonce_field_name.is_some() || submission.nonce_action.is_some() {
            let token = submission
                .nonce_field_name
                .as_deref()
                .and_then(|name| submission.field(name));
            if let Some(code) = self.nonce.verify(
                token,
                submission.nonce_action.as_deref(),
                submission.session_id.as_deref(),
            ) {
                return self.fail_with(code);
            }
        }

        ctx.in_progress = true;

        if self.denylist.check(submission.remote_ip.as_deref()) {
            tracing::warn!(ip = ?submission.remote_ip, "denylisted caller rejected");
            let result = self.fail_with(ErrorCode::Fail);
            return self.resolve(ctx, result);
        }

        if !self.protection_enabled {
            return self.resolve(ctx, VerificationResult::pass());
        }

        let mut honeypot_ok = self.honeypot.check(submission);
        if let Some(hook) = &self.honeypot_override {
            honeypot_ok = hook(honeypot_ok, submission);
        }
        if !honeypot_ok {
            tracing::warn!("honeypot tripped");
            let result = self.fail_with(ErrorCode::Spam);
            return self.resolve(ctx, result);
        }

        if self.submit_time.enabled() {
            let token = submission.field(FST_TOKEN).unwrap_or("");
            match self.submit_time.verify(token, true).await {
                Ok(None) => {}
                Ok(Some(code)) => {
                    let result = self.fail_with(code);
                    return self.resolve(ctx, result);
                }
                Err(e) => {
                    // Store trouble degrades to a generic failure rather
                    // than crashing the caller
                    tracing::error!(error = %e, "submit-time store failure");
                    let result = self.fail_with(ErrorCode::Fail);
                    return self.resolve(ctx, result);
                }
            }
        }

        let response_token = submission.response_token.as_deref().unwrap_or("");
        if response_token.trim().is_empty() {
            let result = self.fail_with(ErrorCode::Empty);
            return self.resolve(ctx, result);
        }

        // The verifier owns sanitization, so the token is escaped exactly
        // once before it leaves the process
        let result = self
            .remote
            .verify(&self.secret, response_token, submission.remote_ip.as_deref())
            .await;
        if result.success {
            tracing::debug!("verification passed");
        } else {
            tracing::debug!(codes = ?result.codes, "verification failed upstream");
        }
        self.resolve(ctx, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::{SubmitProof, SubmitTimeGuard};
    use crate::remote::testing::StubTransport;
    use crate::store::MemoryStore;
    use crate::store::testing::FailingStore;
    use crate::token::TokenSigner;
    use palisade_common::constants::fields::HP_SIGNATURE;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &[u8] = b"test-secret";

    struct Builder {
        protection_enabled: bool,
        honeypot_enabled: bool,
        submit_time_enabled: bool,
        min_submit_secs: u64,
        denylist: DenylistGate,
        transport: StubTransport,
        store: MemoryStore,
    }

    impl Builder {
        fn new() -> Self {
            Self {
                protection_enabled: true,
                honeypot_enabled: false,
                submit_time_enabled: false,
                min_submit_secs: 0,
                denylist: DenylistGate::allow_all(),
                transport: StubTransport::replying(r#"{"success": true}"#),
                store: MemoryStore::new(),
            }
        }

        fn build(self) -> VerificationPipeline<MemoryStore, StubTransport> {
            let signer = TokenSigner::new(SECRET).unwrap();
            let catalog = Arc::new(ErrorCatalog::default());
            VerificationPipeline::new(
                "remote-secret",
                self.protection_enabled,
                catalog.clone(),
                NonceGuard::new(signer.clone(), 86_400, true),
                HoneypotGuard::new(
                    NonceGuard::new(signer.clone(), 86_400, true),
                    self.honeypot_enabled,
                ),
                SubmitTimeGuard::new(
                    signer,
                    self.store,
                    self.submit_time_enabled,
                    self.min_submit_secs,
                    300,
                ),
                self.denylist,
                RemoteVerifier::new(self.transport, "https://verify.example", catalog),
            )
        }
    }

    fn submission_with_token(token: &str) -> Submission {
        Submission {
            response_token: Some(token.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn at_most_once_returns_the_cached_result_even_for_new_inputs() {
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let mut builder = Builder::new();
        builder.transport = transport.clone();
        let pipeline = builder.build();

        let mut ctx = RequestContext::new();
        let first = pipeline
            .verify(&mut ctx, &submission_with_token("tok-a"))
            .await;
        // Different inputs, same request: identical result, no second call
        let second = pipeline
            .verify(&mut ctx, &submission_with_token("tok-b"))
            .await;

        assert_eq!(first, second);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn denylisted_ip_fails_before_the_remote_call() {
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let mut builder = Builder::new();
        builder.transport = transport.clone();
        builder.denylist = DenylistGate::from_entries(["203.0.113.9".to_string()]);
        let pipeline = builder.build();

        let mut sub = submission_with_token("valid-token");
        sub.remote_ip = Some("203.0.113.9".to_string());

        let result = pipeline.verify(&mut RequestContext::new(), &sub).await;
        assert!(!result.success);
        assert!(result.codes.contains(&ErrorCode::Fail));
        // The remote verifier is never invoked for denylisted callers
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn disabled_protection_passes_without_any_checks() {
        let transport = StubTransport::replying(r#"{"success": false}"#);
        let mut builder = Builder::new();
        builder.transport = transport.clone();
        builder.protection_enabled = false;
        builder.honeypot_enabled = true;
        builder.submit_time_enabled = true;
        let pipeline = builder.build();

        // No honeypot fields, no submit-time token, no response token
        let result = pipeline
            .verify(&mut RequestContext::new(), &Submission::default())
            .await;
        assert!(result.success);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn honeypot_trip_fails_with_spam() {
        let mut builder = Builder::new();
        builder.honeypot_enabled = true;
        let pipeline = builder.build();

        let mut sub = submission_with_token("tok");
        sub.fields = vec![("hcap_hp_ab12".to_string(), "filled".to_string())];

        let result = pipeline.verify(&mut RequestContext::new(), &sub).await;
        assert!(result.codes.contains(&ErrorCode::Spam));
    }

    #[tokio::test]
    async fn honeypot_override_can_flip_the_decision() {
        let mut builder = Builder::new();
        builder.honeypot_enabled = true;
        let pipeline = builder
            .build()
            .with_honeypot_override(Arc::new(|_, _| true));

        let mut sub = submission_with_token("tok");
        sub.fields = vec![("hcap_hp_ab12".to_string(), "filled".to_string())];

        let result = pipeline.verify(&mut RequestContext::new(), &sub).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn submit_time_failure_propagates_as_is() {
        let mut builder = Builder::new();
        builder.submit_time_enabled = true;
        let pipeline = builder.build();

        // No token echoed at all
        let result = pipeline
            .verify(&mut RequestContext::new(), &submission_with_token("tok"))
            .await;
        assert!(result.codes.contains(&ErrorCode::BadSignature));
    }

    #[tokio::test]
    async fn store_failure_degrades_to_a_fail_coded_result() {
        let signer = TokenSigner::new(SECRET).unwrap();
        let catalog = Arc::new(ErrorCatalog::default());
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let pipeline = VerificationPipeline::new(
            "remote-secret",
            true,
            catalog.clone(),
            NonceGuard::new(signer.clone(), 86_400, true),
            HoneypotGuard::new(NonceGuard::new(signer.clone(), 86_400, true), false),
            SubmitTimeGuard::new(signer.clone(), FailingStore, true, 0, 300),
            DenylistGate::allow_all(),
            RemoteVerifier::new(transport.clone(), "https://verify.example", catalog),
        )
        .with_result_interceptor(Arc::new(move |r| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            r
        }));

        // Validly signed, so verification reaches the store lookup
        let fst_token = signer
            .create(&SubmitProof {
                context_id: "post-1".to_string(),
                issued_at: 0,
                ttl_secs: 300,
            })
            .unwrap();

        let mut sub = submission_with_token("tok");
        sub.fields = vec![(FST_TOKEN.to_string(), fst_token)];

        let mut ctx = RequestContext::new();
        let result = pipeline.verify(&mut ctx, &sub).await;

        // Store trouble resolves as a generic failure, never an escaped
        // error, and still flows through the interceptor and the cache
        assert!(!result.success);
        assert!(result.codes.contains(&ErrorCode::Fail));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.result(), Some(&result));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn end_to_end_happy_path() {
        let signer = TokenSigner::new(SECRET).unwrap();
        let store = MemoryStore::new();

        // Issue the render-side artifacts before the pipeline takes
        // ownership of the guards
        let issuing =
            SubmitTimeGuard::new(signer.clone(), store.clone(), true, 0, 300);
        let fst_token = issuing.issue("post-77").await.unwrap();
        let hp_signer = NonceGuard::new(signer.clone(), 86_400, true);
        let hp_name = "hcap_hp_cafe".to_string();
        let hp_sig = hp_signer.issue(&hp_name, "user-7");
        let nonce = NonceGuard::new(signer, 86_400, true).issue("submit-form", "user-7");

        let mut builder = Builder::new();
        builder.honeypot_enabled = true;
        builder.submit_time_enabled = true;
        builder.store = store;
        let transport = StubTransport::replying(r#"{"success": true}"#);
        builder.transport = transport.clone();
        let pipeline = builder.build();

        let sub = Submission {
            response_token: Some("solved-token".to_string()),
            nonce_field_name: Some("form_nonce".to_string()),
            nonce_action: Some("submit-form".to_string()),
            session_id: Some("user-7".to_string()),
            remote_ip: Some("198.51.100.3".to_string()),
            fields: vec![
                ("form_nonce".to_string(), nonce),
                (hp_name, String::new()),
                (HP_SIGNATURE.to_string(), hp_sig),
                ("hcap_fst_token".to_string(), fst_token),
            ],
        };

        let result = pipeline.verify(&mut RequestContext::new(), &sub).await;
        assert!(result.success, "expected pass, got {result:?}");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn upstream_sees_the_token_escaped_exactly_once() {
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let mut builder = Builder::new();
        builder.transport = transport.clone();
        let pipeline = builder.build();

        pipeline
            .verify(&mut RequestContext::new(), &submission_with_token("tok&en"))
            .await;

        assert_eq!(
            transport.last_field("response").as_deref(),
            Some("tok&amp;en")
        );
    }

    #[tokio::test]
    async fn upstream_error_codes_pass_through_with_catalog_message() {
        let mut builder = Builder::new();
        builder.transport = StubTransport::replying(
            r#"{"success": false, "error-codes": ["invalid-input-response"]}"#,
        );
        let pipeline = builder.build();

        let result = pipeline
            .verify(&mut RequestContext::new(), &submission_with_token("tok"))
            .await;
        assert!(result.codes.contains(&ErrorCode::InvalidInputResponse));
        assert_eq!(
            result.message,
            "error: The response parameter (verification token) is invalid or malformed."
        );
    }

    #[tokio::test]
    async fn bad_nonce_fails_for_authenticated_but_not_anonymous_sessions() {
        // The asymmetry is deliberate: nonce protection is a CSRF defense
        // for logged-in sessions only; anonymous submissions rely on the
        // CAPTCHA itself.
        let pipeline = Builder::new().build();

        let mut sub = submission_with_token("tok");
        sub.nonce_field_name = Some("form_nonce".to_string());
        sub.nonce_action = Some("submit-form".to_string());
        sub.fields = vec![("form_nonce".to_string(), "forged".to_string())];

        sub.session_id = Some("user-7".to_string());
        let result = pipeline
            .verify(&mut RequestContext::new(), &sub)
            .await;
        assert!(result.codes.contains(&ErrorCode::BadNonce));

        sub.session_id = None;
        let result = pipeline
            .verify(&mut RequestContext::new(), &sub)
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn nonce_failure_does_not_resolve_the_request() {
        let pipeline = Builder::new().build();

        let mut sub = submission_with_token("tok");
        sub.nonce_field_name = Some("form_nonce".to_string());
        sub.nonce_action = Some("submit-form".to_string());
        sub.session_id = Some("user-7".to_string());
        sub.fields = vec![("form_nonce".to_string(), "forged".to_string())];

        let mut ctx = RequestContext::new();
        let result = pipeline.verify(&mut ctx, &sub).await;
        assert!(result.codes.contains(&ErrorCode::BadNonce));
        // A later call with a fixed nonce can still verify
        assert!(ctx.result().is_none());
    }

    #[tokio::test]
    async fn empty_response_token_short_circuits_without_network() {
        let transport = StubTransport::replying(r#"{"success": true}"#);
        let mut builder = Builder::new();
        builder.transport = transport.clone();
        let pipeline = builder.build();

        let result = pipeline
            .verify(&mut RequestContext::new(), &Submission::default())
            .await;
        assert!(result.codes.contains(&ErrorCode::Empty));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn interceptor_sees_every_resolving_path() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let mut builder = Builder::new();
        builder.denylist = DenylistGate::from_entries(["203.0.113.9".to_string()]);
        let pipeline = builder.build().with_result_interceptor(Arc::new(move |r| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            r
        }));

        // Denylist path
        let mut sub = submission_with_token("tok");
        sub.remote_ip = Some("203.0.113.9".to_string());
        pipeline.verify(&mut RequestContext::new(), &sub).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Remote path
        pipeline
            .verify(&mut RequestContext::new(), &submission_with_token("tok"))
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        // Cached path does not re-run the interceptor
        let mut ctx = RequestContext::new();
        pipeline
            .verify(&mut ctx, &submission_with_token("tok"))
            .await;
        pipeline
            .verify(&mut ctx, &submission_with_token("tok"))
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn interceptor_can_override_the_result() {
        let pipeline = Builder::new()
            .build()
            .with_result_interceptor(Arc::new(|_| {
                VerificationResult::fail("error: overridden.", [ErrorCode::Fail])
            }));

        let mut ctx = RequestContext::new();
        let result = pipeline
            .verify(&mut ctx, &submission_with_token("tok"))
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "error: overridden.");
        // The override is what gets cached
        assert_eq!(ctx.result().unwrap(), &result);
    }
}
