//! Key builders for every coordination entry.
//!
//! The Redis client prepends the configured prefix; these builders only
//! produce the logical part.

/// Key of a named distributed lock.
pub fn lock(name: &str) -> String {
    format!("lock:{name}")
}

/// Key of the token bucket of `subject` under `policy`.
pub fn rate_bucket(policy: &str, subject: &str) -> String {
    format!("rate:{policy}:{subject}")
}
