//! Parse -> resolve -> rewrite pipeline for bubble flows.
//!
//! A flow is TypeScript source whose handler instantiates bubbles
//! (`await new SlackBubble({ ... }).action()`). Before it runs, the flow
//! service parses out every call site, resolves the secrets each bubble needs
//! and splices them back in as a `credentials` argument:
//!
//! ```text
//! source ──parse──> BubbleMap ──inject_credentials──> BubbleMap' ──reconstruct──> source'
//! ```
//!
//! Nothing here executes flow code; parameter values are carried as source
//! text and only ever read with a literal-only evaluator.

use std::sync::Arc;

pub mod config;
pub mod credential;
pub mod error;
pub mod literal;
pub mod model;
pub mod parser;
pub mod reconstruct;
pub mod registry;
pub mod resolver;
pub mod scan;
pub mod source;

pub use config::{InjectorConfig, SystemCredentials};
pub use credential::{
    BrowserCookie, BrowserSessionData, CredentialGrant, CredentialType, Provenance, ResolvedCredential,
};
pub use error::{FlowError, FlowResult};
pub use model::{BubbleCallSite, BubbleMap, ParamKind, ParamValue, ParameterValue};
pub use parser::{FlowParser, ParseResult};
pub use reconstruct::{FlowReconstructor, ReconstructResult};
pub use registry::{BubbleDescriptor, BubbleRegistry};
pub use resolver::{
    BrowserSessionProvider, CredentialInjector, InjectionResult, OAuthTokenProvider, Unavailable,
};

// -----------------------------------------------------------------------------
// Entrypoints (built-in registry)
// -----------------------------------------------------------------------------

/// Parse `source` against the built-in registry.
pub fn parse(source: &str) -> ParseResult {
    FlowParser::new(BubbleRegistry::builtin()).parse(source)
}

/// Rewrite `source` from `bubbles` using the built-in registry.
pub fn reconstruct(source: &str, bubbles: &BubbleMap) -> ReconstructResult {
    FlowReconstructor::new(BubbleRegistry::builtin()).reconstruct(source, bubbles)
}

/// Resolve and inject credentials with the built-in registry, default config
/// and operator defaults taken from the process environment.
pub async fn inject_credentials(
    source: &str,
    bubbles: &mut BubbleMap,
    grants: &[CredentialGrant],
    oauth: Arc<dyn OAuthTokenProvider>,
    browser: Arc<dyn BrowserSessionProvider>,
) -> InjectionResult {
    let config = InjectorConfig::default();
    let system = SystemCredentials::from_env(&config);
    CredentialInjector::new(BubbleRegistry::builtin(), oauth, browser)
        .with_config(config)
        .with_system_credentials(system)
        .inject_credentials(source, bubbles, grants)
        .await
}
