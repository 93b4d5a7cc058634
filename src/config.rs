use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::credential::CredentialType;

pub const DEFAULT_ACTION_METHOD: &str = "action";

// -----------------------------------------------------------------------------
// Injector config
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InjectorConfig {
    /// Seed operator defaults from the environment table before applying grants.
    pub inject_system_credentials: bool,
    /// Resolve distinct bubbles concurrently. Grants within one bubble stay ordered.
    pub concurrent_resolution: bool,
    /// Replaces entries of the credential type -> env var table.
    pub env_overrides: BTreeMap<CredentialType, String>,
    /// Trailing method that runs a bubble (`new X({...}).action()`).
    pub action_method: String,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            inject_system_credentials: true,
            concurrent_resolution: true,
            env_overrides: BTreeMap::new(),
            action_method: DEFAULT_ACTION_METHOD.to_string(),
        }
    }
}

impl InjectorConfig {
    /// Read config JSON handed over by the flow service. Invalid input falls back to defaults.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "invalid injector config, using defaults");
                Self::default()
            }
        }
    }

    pub fn env_var_for(&self, credential_type: CredentialType) -> Option<&str> {
        self.env_overrides
            .get(&credential_type)
            .map(|s| s.as_str())
            .or_else(|| credential_type.default_env_var())
    }
}

// -----------------------------------------------------------------------------
// Operator defaults
// -----------------------------------------------------------------------------

/// Operator-level secrets, keyed by credential type.
#[derive(Clone, Default)]
pub struct SystemCredentials {
    values: HashMap<CredentialType, String>,
}

impl SystemCredentials {
    /// Snapshot every table entry whose env var is set and non-empty.
    pub fn from_env(config: &InjectorConfig) -> Self {
        let mut values = HashMap::new();
        for t in CredentialType::ALL {
            let Some(var) = config.env_var_for(t) else { continue };
            if let Ok(v) = std::env::var(var) {
                if !v.is_empty() {
                    values.insert(t, v);
                }
            }
        }
        tracing::debug!(count = values.len(), "loaded system credentials from environment");
        Self { values }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (CredentialType, S)>,
        S: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .filter(|(t, _)| t.is_system_managed())
                .map(|(t, v)| (t, v.into()))
                .collect(),
        }
    }

    pub fn get(&self, credential_type: CredentialType) -> Option<&str> {
        self.values.get(&credential_type).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for SystemCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("SystemCredentials").field("types", &keys).finish()
    }
}
