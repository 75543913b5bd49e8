//! # Gatehouse - Palisade Verification Core
//!
//! Takes a raw form submission, decides whether it should be treated as
//! trusted traffic, and produces a definitive allow/deny decision with a
//! typed reason. Form-integration adapters call
//! [`pipeline::VerificationPipeline::verify`] with a per-request
//! [`pipeline::RequestContext`]; the pipeline composes the guards in
//! strict order and resolves at most one remote verification per request.
//!
//! ## Modules
//! - `token` - signed token creation/validation (`base64(json)-hmac`)
//! - `guards` - denylist, nonce, honeypot, and submit-time checks
//! - `remote` - the remote CAPTCHA verification call
//! - `pipeline` - the orchestrator and its extension hooks
//! - `catalog` - error code to display message mapping
//! - `store` - single-use record storage (Redis or in-memory)

pub mod catalog;
pub mod guards;
pub mod pipeline;
pub mod remote;
pub mod store;
pub mod token;
