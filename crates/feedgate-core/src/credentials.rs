use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::ProviderId;

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Per-call credential lookup. Implementations are queried on every upstream
/// request so rotated keys take effect without a restart.
pub trait CredentialsProvider: Send + Sync {
    fn api_key(&self, provider: &ProviderId) -> Option<String>;
}

/// Reads `FEEDGATE_<PROVIDER>_API_KEY`, falling back to `<PROVIDER>_API_KEY`.
#[derive(Clone)]
pub struct EnvCredentials {
    lookup: Lookup,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    pub fn variable_names(provider: &ProviderId) -> [String; 2] {
        let token = provider.env_token();
        [format!("FEEDGATE_{token}_API_KEY"), format!("{token}_API_KEY")]
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for EnvCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials").finish_non_exhaustive()
    }
}

impl CredentialsProvider for EnvCredentials {
    fn api_key(&self, provider: &ProviderId) -> Option<String> {
        Self::variable_names(provider)
            .iter()
            .filter_map(|name| (self.lookup)(name))
            .map(|value| value.trim().to_owned())
            .find(|value| !value.is_empty())
    }
}

/// Fixed keys, for tests and embedded deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<ProviderId, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }
}

impl CredentialsProvider for StaticCredentials {
    fn api_key(&self, provider: &ProviderId) -> Option<String> {
        self.keys.get(provider).cloned()
    }
}
