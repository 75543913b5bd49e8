//! Short-circuiting security checks composed by the verification pipeline.

mod denylist;
mod honeypot;
mod nonce;
mod submit_time;

pub use denylist::{DenylistGate, DenylistPredicate};
pub use honeypot::HoneypotGuard;
pub use nonce::NonceGuard;
pub use submit_time::{SubmitProof, SubmitTimeGuard, TokenFilter};
