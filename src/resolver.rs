use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{InjectorConfig, SystemCredentials};
use crate::credential::{
    escape_secret, BrowserSessionData, CredentialGrant, CredentialType, Provenance, ResolvedCredential,
};
use crate::error::FlowError;
use crate::literal::evaluate_literal;
use crate::model::{BubbleCallSite, BubbleMap, ParamKind, ParamValue, ParameterValue, CREDENTIALS_PARAM};
use crate::reconstruct::FlowReconstructor;
use crate::registry::BubbleRegistry;

pub const TOOLS_PARAM: &str = "tools";

/// Bubble types that receive grant metadata as an extra parameter.
pub const CONTEXT_INJECTION_BUBBLES: &[&str] = &["ai-agent", "database-analyzer"];
/// The credential type whose grant metadata is forwarded.
pub const CONTEXT_CREDENTIAL: CredentialType = CredentialType::DatabaseCred;
pub const CONTEXT_PARAM: &str = "injectedMetadata";

// -----------------------------------------------------------------------------
// External providers
// -----------------------------------------------------------------------------

/// Hands out a currently valid access token, refreshing it if needed.
#[async_trait::async_trait]
pub trait OAuthTokenProvider: Send + Sync {
    async fn get_valid_token(&self, external_credential_id: &str) -> anyhow::Result<Option<String>>;
}

/// Looks up a captured browser session.
#[async_trait::async_trait]
pub trait BrowserSessionProvider: Send + Sync {
    async fn get_credential_data(
        &self,
        external_credential_id: &str,
    ) -> anyhow::Result<Option<BrowserSessionData>>;
}

/// Provider for deployments without OAuth or browser sessions; never yields anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

#[async_trait::async_trait]
impl OAuthTokenProvider for Unavailable {
    async fn get_valid_token(&self, _external_credential_id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[async_trait::async_trait]
impl BrowserSessionProvider for Unavailable {
    async fn get_credential_data(
        &self,
        _external_credential_id: &str,
    ) -> anyhow::Result<Option<BrowserSessionData>> {
        Ok(None)
    }
}

// -----------------------------------------------------------------------------
// Results
// -----------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionResult {
    pub success: bool,
    pub new_source_text: Option<String>,
    /// Identity -> `"TYPE (provenance), ..."`. Never contains secret values.
    pub provenance: BTreeMap<String, String>,
    pub errors: Vec<FlowError>,
    /// Provider lookups that failed and left a grant uninjected.
    pub warnings: Vec<FlowError>,
}

#[derive(Debug)]
struct BubbleJob<'g> {
    identity: String,
    bubble_type: String,
    accepted: Vec<CredentialType>,
    grants: Vec<&'g CredentialGrant>,
}

#[derive(Debug, Default)]
struct BubbleResolution {
    identity: String,
    credentials: IndexMap<CredentialType, ResolvedCredential>,
    metadata: Option<Value>,
    failures: Vec<FlowError>,
}

impl BubbleResolution {
    fn summary(&self) -> String {
        self.credentials
            .values()
            .map(|c| format!("{} ({})", c.credential_type, c.provenance))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn set(&mut self, credential_type: CredentialType, value: String, provenance: Provenance) {
        self.credentials.insert(
            credential_type,
            ResolvedCredential {
                credential_type,
                value,
                provenance,
            },
        );
    }
}

// -----------------------------------------------------------------------------
// Injector
// -----------------------------------------------------------------------------

/// Works out which secrets each bubble gets and writes them into the flow.
pub struct CredentialInjector<'r> {
    registry: &'r BubbleRegistry,
    oauth: Arc<dyn OAuthTokenProvider>,
    browser: Arc<dyn BrowserSessionProvider>,
    system: SystemCredentials,
    config: InjectorConfig,
}

impl<'r> CredentialInjector<'r> {
    pub fn new(
        registry: &'r BubbleRegistry,
        oauth: Arc<dyn OAuthTokenProvider>,
        browser: Arc<dyn BrowserSessionProvider>,
    ) -> Self {
        Self {
            registry,
            oauth,
            browser,
            system: SystemCredentials::default(),
            config: InjectorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InjectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_credentials(mut self, system: SystemCredentials) -> Self {
        self.system = system;
        self
    }

    /// Resolve credentials for every bubble in `bubbles`, record them as
    /// `credentials` parameters, and rewrite `source` accordingly.
    ///
    /// When nothing is injected the original text is returned as is.
    pub async fn inject_credentials(
        &self,
        source: &str,
        bubbles: &mut BubbleMap,
        grants: &[CredentialGrant],
    ) -> InjectionResult {
        for grant in grants {
            if !bubbles.contains(&grant.target_identity) {
                tracing::debug!(
                    target_identity = %grant.target_identity,
                    credential_type = %grant.credential_type,
                    "grant targets no bubble in this flow"
                );
            }
        }

        let jobs: Vec<BubbleJob<'_>> = bubbles
            .iter()
            .filter_map(|site| self.plan(site, grants))
            .collect();

        let resolutions: Vec<BubbleResolution> = if self.config.concurrent_resolution {
            join_all(jobs.iter().map(|job| self.resolve(job))).await
        } else {
            let mut out = Vec::with_capacity(jobs.len());
            for job in &jobs {
                out.push(self.resolve(job).await);
            }
            out
        };

        let mut result = InjectionResult::default();
        let mut changed = false;
        for mut res in resolutions {
            result.warnings.append(&mut res.failures);
            let Some(site) = bubbles.get_mut(&res.identity) else {
                continue;
            };
            if !res.credentials.is_empty() {
                site.upsert_parameter(ParameterValue::from_source(
                    CREDENTIALS_PARAM,
                    ParamKind::Object,
                    render_credentials(&res.credentials),
                ));
                result.provenance.insert(res.identity.clone(), res.summary());
                changed = true;
            }
            if let Some(metadata) = res.metadata.take() {
                site.upsert_parameter(ParameterValue {
                    name: CONTEXT_PARAM.to_string(),
                    kind: ParamKind::Object,
                    value: ParamValue::Data(metadata),
                });
                changed = true;
            }
            tracing::debug!(identity = %res.identity, provenance = %res.summary(), "resolved bubble credentials");
        }

        if !changed {
            result.success = true;
            result.new_source_text = Some(source.to_string());
            return result;
        }

        let rebuilt = FlowReconstructor::new(self.registry)
            .with_action_method(self.config.action_method.clone())
            .reconstruct(source, bubbles);
        for identity in rebuilt.skipped {
            result.provenance.remove(&identity);
            result.warnings.push(FlowError::SiteNotRewritten { identity });
        }
        result.success = rebuilt.success;
        result.new_source_text = rebuilt.new_source_text;
        result.errors = rebuilt.errors;
        result
    }

    /// Decide what one bubble may receive. `None` when it accepts nothing.
    fn plan<'g>(&self, site: &BubbleCallSite, grants: &'g [CredentialGrant]) -> Option<BubbleJob<'g>> {
        let accepted = self.accepted_types(site);
        if accepted.is_empty() {
            return None;
        }
        tracing::debug!(identity = %site.identity, ?accepted, "accepted credential types");
        Some(BubbleJob {
            identity: site.identity.clone(),
            bubble_type: site.bubble_type.clone(),
            accepted,
            grants: grants
                .iter()
                .filter(|g| g.target_identity == site.identity)
                .collect(),
        })
    }

    fn accepted_types(&self, site: &BubbleCallSite) -> Vec<CredentialType> {
        let Some(descriptor) = self.registry.by_bubble_name(&site.bubble_type) else {
            return vec![];
        };
        let mut accepted = descriptor.credential_types.clone();
        if descriptor.tool_introspection {
            for t in self.tool_credential_types(site) {
                if !accepted.contains(&t) {
                    accepted.push(t);
                }
            }
        }
        accepted
    }

    /// Credential types needed by the tools declared in the `tools` parameter.
    /// Anything that is not a plain literal contributes nothing.
    fn tool_credential_types(&self, site: &BubbleCallSite) -> Vec<CredentialType> {
        let Some(text) = site.parameter(TOOLS_PARAM).and_then(|p| p.literal_text()) else {
            return vec![];
        };
        let tools = match evaluate_literal(text) {
            Ok(Value::Array(tools)) => tools,
            Ok(_) => return vec![],
            Err(err) => {
                tracing::debug!(identity = %site.identity, error = %err, "tools are not a literal list");
                return vec![];
            }
        };
        tools
            .iter()
            .filter_map(|tool| tool.get("name").and_then(Value::as_str))
            .flat_map(|name| self.registry.accepted_credential_types(name).iter().copied())
            .collect()
    }

    async fn resolve(&self, job: &BubbleJob<'_>) -> BubbleResolution {
        let mut res = BubbleResolution {
            identity: job.identity.clone(),
            ..Default::default()
        };

        if self.config.inject_system_credentials {
            for &t in &job.accepted {
                if let Some(value) = self.system.get(t) {
                    res.set(t, value.to_string(), Provenance::System);
                }
            }
        }

        for grant in &job.grants {
            let t = grant.credential_type;
            if t == CONTEXT_CREDENTIAL && CONTEXT_INJECTION_BUBBLES.contains(&job.bubble_type.as_str()) {
                if let Some(meta) = &grant.aux_metadata {
                    res.metadata = Some(enabled_projection(meta));
                }
            }
            if !job.accepted.contains(&t) {
                tracing::debug!(identity = %job.identity, credential_type = %t, "grant type not accepted by bubble");
                continue;
            }

            if t.is_oauth() {
                if let Some(token) = self.oauth_token(job, grant, &mut res.failures).await {
                    res.set(t, token, Provenance::OauthRefreshed);
                }
            } else if t.is_browser_session() {
                if let Some(session) = self.browser_session(job, grant, &mut res.failures).await {
                    match serde_json::to_string(&session) {
                        Ok(value) => res.set(t, value, Provenance::BrowserSession),
                        Err(err) => res.failures.push(provider_failure(job, t, err.to_string())),
                    }
                }
            } else {
                res.set(t, grant.secret_text.clone(), Provenance::User);
            }
        }
        res
    }

    async fn oauth_token(
        &self,
        job: &BubbleJob<'_>,
        grant: &CredentialGrant,
        failures: &mut Vec<FlowError>,
    ) -> Option<String> {
        let t = grant.credential_type;
        let Some(id) = grant.external_credential_id.as_deref() else {
            failures.push(provider_failure(job, t, "grant has no external credential id".to_string()));
            return None;
        };
        match self.oauth.get_valid_token(id).await {
            Ok(Some(token)) if !token.is_empty() => Some(token),
            Ok(_) => {
                tracing::debug!(identity = %job.identity, credential_type = %t, "no oauth token available");
                None
            }
            Err(err) => {
                tracing::warn!(identity = %job.identity, credential_type = %t, error = %err, "oauth token lookup failed");
                failures.push(provider_failure(job, t, err.to_string()));
                None
            }
        }
    }

    async fn browser_session(
        &self,
        job: &BubbleJob<'_>,
        grant: &CredentialGrant,
        failures: &mut Vec<FlowError>,
    ) -> Option<BrowserSessionData> {
        let t = grant.credential_type;
        let Some(id) = grant.external_credential_id.as_deref() else {
            failures.push(provider_failure(job, t, "grant has no external credential id".to_string()));
            return None;
        };
        match self.browser.get_credential_data(id).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(identity = %job.identity, credential_type = %t, error = %err, "browser session lookup failed");
                failures.push(provider_failure(job, t, err.to_string()));
                None
            }
        }
    }
}

fn provider_failure(job: &BubbleJob<'_>, credential_type: CredentialType, message: String) -> FlowError {
    FlowError::CredentialProvider {
        credential_type,
        identity: job.identity.clone(),
        message,
    }
}

/// `{ TYPE: "escaped", ... }` in resolution order.
fn render_credentials(credentials: &IndexMap<CredentialType, ResolvedCredential>) -> String {
    let pairs: Vec<String> = credentials
        .values()
        .map(|c| format!("{}: \"{}\"", c.credential_type, escape_secret(&c.value)))
        .collect();
    format!("{{ {} }}", pairs.join(", "))
}

/// Keep only entries flagged `enabled: true`; values without the flag are walked recursively.
pub fn enabled_projection(value: &Value) -> Value {
    fn keep(v: &Value) -> bool {
        match v.get("enabled") {
            Some(flag) => flag.as_bool() == Some(true),
            None => true,
        }
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_object() || keep(v))
                .map(enabled_projection)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_object() || keep(v))
                .map(|(k, v)| (k.clone(), enabled_projection(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credentials_render_in_resolution_order() {
        let mut res = BubbleResolution::default();
        res.set(CredentialType::OpenaiCred, "sk-sys".into(), Provenance::System);
        res.set(CredentialType::FirecrawlApiKey, "fc\"1".into(), Provenance::User);
        res.set(CredentialType::OpenaiCred, "sk-user".into(), Provenance::User);
        assert_eq!(
            render_credentials(&res.credentials),
            r#"{ OPENAI_CRED: "sk-user", FIRECRAWL_API_KEY: "fc\"1" }"#
        );
        assert_eq!(res.summary(), "OPENAI_CRED (user), FIRECRAWL_API_KEY (user)");
    }

    #[test]
    fn projection_keeps_enabled_entries_only() {
        let meta = json!({
            "tables": [
                { "name": "users", "enabled": true },
                { "name": "audit", "enabled": false },
                { "name": "legacy" }
            ],
            "schemas": {
                "public": { "enabled": true, "rules": ["no-pii"] },
                "internal": { "enabled": false }
            },
            "note": "kept"
        });
        assert_eq!(
            enabled_projection(&meta),
            json!({
                "tables": [
                    { "name": "users", "enabled": true },
                    { "name": "legacy" }
                ],
                "schemas": { "public": { "enabled": true, "rules": ["no-pii"] } },
                "note": "kept"
            })
        );
    }

    #[tokio::test]
    async fn unavailable_providers_yield_nothing() {
        assert!(Unavailable.get_valid_token("x").await.unwrap().is_none());
        assert!(Unavailable.get_credential_data("x").await.unwrap().is_none());
    }
}
