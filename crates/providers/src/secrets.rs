//! Secret resolution for provider credentials.
//!
//! Adapters never read the environment directly; they go through a
//! [`SecretStore`] so deployments can swap in a real vault without touching
//! the adapters. Workflow code never touches this — secrets are resolved at
//! startup when the registry is built.

use ah_domain::error::{Error, Result};

/// Named-secret lookup.
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Result<String>;
}

/// Environment-backed secret store (the default deployment mode).
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Result<String> {
        std::env::var(name).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{name}' not set or not valid UTF-8"
            ))
        })
    }
}
