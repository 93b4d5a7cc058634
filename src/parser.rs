use serde::Serialize;

use crate::config::DEFAULT_ACTION_METHOD;
use crate::error::FlowError;
use crate::model::{BubbleCallSite, BubbleMap};
use crate::registry::BubbleRegistry;
use crate::scan::{scan_call_sites, SiteArgs};
use crate::source::parse_flow;

/// Host constructors that may appear in a flow without being bubbles.
pub const HOST_CONSTRUCTORS: &[&str] = &[
    "AbortController",
    "Array",
    "ArrayBuffer",
    "Blob",
    "Buffer",
    "Date",
    "Error",
    "FormData",
    "Headers",
    "Intl",
    "Map",
    "Object",
    "Promise",
    "RangeError",
    "RegExp",
    "Request",
    "Response",
    "Set",
    "TextDecoder",
    "TextEncoder",
    "TypeError",
    "URL",
    "URLSearchParams",
    "Uint8Array",
    "WeakMap",
    "WeakSet",
];

#[derive(Debug, Default, Serialize)]
pub struct ParseResult {
    pub success: bool,
    pub bubbles: BubbleMap,
    pub errors: Vec<FlowError>,
    pub warnings: Vec<String>,
}

impl ParseResult {
    fn syntax_failure(err: FlowError) -> Self {
        Self {
            success: false,
            errors: vec![err],
            ..Default::default()
        }
    }
}

/// Extracts bubble call sites from flow source.
pub struct FlowParser<'r> {
    registry: &'r BubbleRegistry,
    action_method: String,
}

impl<'r> FlowParser<'r> {
    pub fn new(registry: &'r BubbleRegistry) -> Self {
        Self {
            registry,
            action_method: DEFAULT_ACTION_METHOD.to_string(),
        }
    }

    pub fn with_action_method(mut self, action_method: impl Into<String>) -> Self {
        self.action_method = action_method.into();
        self
    }

    pub fn parse(&self, source: &str) -> ParseResult {
        let parsed = match parse_flow(source) {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(error = %err, "flow source does not parse");
                return ParseResult::syntax_failure(err);
            }
        };

        let mut bubbles = BubbleMap::new();
        let mut errors = vec![];
        let mut warnings = vec![];

        for site in scan_call_sites(&parsed, &self.action_method) {
            let Some(descriptor) = self.registry.resolve(&site.class_name) else {
                // Only `new X()` / `new X({ ... })` claims to be a bubble.
                if site.args != SiteArgs::Unsupported
                    && !HOST_CONSTRUCTORS.contains(&site.class_name.as_str())
                {
                    errors.push(FlowError::UnregisteredBubbleType {
                        class_name: site.class_name,
                        registered: self.registry.list(),
                    });
                }
                continue;
            };
            let SiteArgs::Params(parameters) = site.args else {
                warnings.push(format!(
                    "{} at line {} is not constructed from a single object literal; skipped",
                    site.class_name, site.start_line
                ));
                continue;
            };

            let identity = match &site.binding {
                Some(name) => name.clone(),
                None => BubbleCallSite::anonymous_identity(&site.class_name, bubbles.len()),
            };
            let call_site = BubbleCallSite {
                identity,
                binding: site.binding,
                bubble_type: descriptor.bubble_name.clone(),
                class_name: site.class_name,
                parameters,
                is_awaited: site.is_awaited,
                has_action_call: site.has_action_call,
                start: site.start,
                end: site.end,
                start_line: site.start_line,
                end_line: site.end_line,
            };
            let (identity, line) = (call_site.identity.clone(), call_site.start_line);
            if !bubbles.insert(call_site) {
                warnings.push(format!(
                    "'{identity}' at line {line} reuses an existing bubble name; it is left unchanged on rewrite"
                ));
            }
        }

        tracing::debug!(
            bubbles = bubbles.len(),
            errors = errors.len(),
            warnings = warnings.len(),
            "parsed flow source"
        );

        ParseResult {
            success: errors.is_empty(),
            bubbles,
            errors,
            warnings,
        }
    }
}
