//! IP denylist gate.
//!
//! Evaluated before any other post-nonce check: a denylisted caller must
//! never reach the remote verifier (the call is billable, and a rejection
//! response would leak information).

use std::collections::HashSet;
use std::sync::Arc;

/// Externally injected rejection predicate. Returns true when the caller
/// must be rejected unconditionally.
pub type DenylistPredicate = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Policy hook wrapping the predicate; default allows everyone.
#[derive(Clone)]
pub struct DenylistGate {
    predicate: DenylistPredicate,
}

impl DenylistGate {
    pub fn new(predicate: DenylistPredicate) -> Self {
        Self { predicate }
    }

    /// Default policy: nobody is denylisted
    pub fn allow_all() -> Self {
        Self::new(Arc::new(|_| false))
    }

    /// Static denylist from configuration entries
    pub fn from_entries(entries: impl IntoIterator<Item = String>) -> Self {
        let set: HashSet<String> = entries.into_iter().collect();
        Self::new(Arc::new(move |ip| {
            ip.map(|ip| set.contains(ip)).unwrap_or(false)
        }))
    }

    /// True when the caller IP is denylisted
    pub fn check(&self, caller_ip: Option<&str>) -> bool {
        (self.predicate)(caller_ip)
    }
}
