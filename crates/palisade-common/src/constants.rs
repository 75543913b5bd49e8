//! Shared constants for Palisade components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Gatehouse HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8899";

/// Default remote verification endpoint
pub const DEFAULT_VERIFY_URL: &str = "https://api.hcaptcha.com/siteverify";

/// Default remote call timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// Default submit-time token TTL (also the single-use record TTL)
pub const DEFAULT_FST_TTL_SECS: u64 = 300;

/// Hard floor for the submit-time token TTL
pub const MIN_FST_TTL_SECS: u64 = 60;

/// Default minimum dwell time between render and submit
pub const DEFAULT_MIN_SUBMIT_SECS: u64 = 2;

/// Default nonce lifetime (a nonce stays valid for two half-life ticks)
pub const DEFAULT_NONCE_LIFETIME_SECS: u64 = 86_400;

/// Posted field names (the widget-side contract)
pub mod fields {
    /// The CAPTCHA widget's response token
    pub const RESPONSE: &str = "h-captcha-response";

    /// Echoed submit-time token
    pub const FST_TOKEN: &str = "hcap_fst_token";

    /// Honeypot field name prefix: hcap_hp_{random}
    pub const HP_PREFIX: &str = "hcap_hp_";

    /// Honeypot anti-tamper signature field
    pub const HP_SIGNATURE: &str = "hcap_hp_sig";
}

/// Redis key prefixes
pub mod store_keys {
    /// Single-use submit-time record: fst_{signature}
    pub const FST_PREFIX: &str = "fst_";
}
