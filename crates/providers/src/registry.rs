//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup
//! the registry reads the [`LlmConfig`], resolves credentials through the
//! secret store, and instantiates an adapter for each configured provider.
//! Providers that fail to initialize are logged and skipped rather than
//! aborting startup.

use std::collections::HashMap;
use std::sync::Arc;

use ah_domain::config::LlmConfig;
use ah_domain::error::Result;

use crate::openai_compat::OpenAiCompatProvider;
use crate::secrets::SecretStore;
use crate::traits::LlmProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// Provider IDs that failed to initialize, with their error messages.
    init_errors: Vec<(String, String)>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Credentials are resolved eagerly so a missing secret surfaces at
    /// startup, not on the first task.
    pub fn from_config(config: &LlmConfig, secrets: &dyn SecretStore) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors = Vec::new();

        for pc in &config.providers {
            match OpenAiCompatProvider::from_config(pc, secrets) {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, "registered LLM provider");
                    providers.insert(pc.id.clone(), Arc::new(provider));
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push((pc.id.clone(), e.to_string()));
                }
            }
        }

        Ok(Self {
            providers,
            init_errors,
        })
    }

    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            init_errors: Vec::new(),
        }
    }

    /// Look up a provider by id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers that failed to initialize (for readiness reporting).
    pub fn init_errors(&self) -> &[(String, String)] {
        &self.init_errors
    }
}
