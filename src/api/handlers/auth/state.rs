//! Auth settings shared by the handlers.

use crate::password::DEFAULT_COST;

/// Runtime settings for the auth handlers, injected as an axum `Extension`.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    bcrypt_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bcrypt_cost: DEFAULT_COST,
        }
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
