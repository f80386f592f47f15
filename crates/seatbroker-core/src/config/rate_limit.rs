//! Named rate-limit policy configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One token-bucket policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicyConfig {
    /// Bucket capacity (burst size).
    pub capacity: u32,
    /// Continuous refill rate in tokens per second.
    pub refill_per_second: f64,
}

/// Built-in policies used by the redemption facade.
pub fn default_policies() -> HashMap<String, RateLimitPolicyConfig> {
    let mut policies = HashMap::new();
    policies.insert(
        "redeem".to_string(),
        RateLimitPolicyConfig {
            capacity: 5,
            refill_per_second: 5.0 / 60.0,
        },
    );
    policies.insert(
        "switch".to_string(),
        RateLimitPolicyConfig {
            capacity: 3,
            refill_per_second: 3.0 / 3600.0,
        },
    );
    policies.insert(
        "refresh".to_string(),
        RateLimitPolicyConfig {
            capacity: 3,
            refill_per_second: 3.0 / 3600.0,
        },
    );
    policies
}
