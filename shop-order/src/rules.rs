use serde::{Deserialize, Serialize};

use crate::status::TransitionPolicy;

/// Business switches of the order paths, loaded from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderRules {
    #[serde(default)]
    pub transition_policy: TransitionPolicy,
    /// Put inventory back when a creation run fails after decrementing it.
    #[serde(default = "default_compensate")]
    pub compensate_inventory: bool,
}

fn default_compensate() -> bool {
    true
}

impl Default for OrderRules {
    fn default() -> Self {
        Self {
            transition_policy: TransitionPolicy::default(),
            compensate_inventory: default_compensate(),
        }
    }
}
