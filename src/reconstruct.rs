use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use crate::config::DEFAULT_ACTION_METHOD;
use crate::error::FlowError;
use crate::model::{BubbleCallSite, BubbleMap, ParamValue, ParameterValue};
use crate::registry::BubbleRegistry;
use crate::scan::{scan_call_sites, SiteArgs};
use crate::source::parse_flow;

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex"));
static LITERAL_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:["'`{\[]|[0-9])"#).expect("valid regex"));

const LITERAL_KEYWORDS: &[&str] = &["true", "false", "null", "undefined"];

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructResult {
    pub success: bool,
    pub new_source_text: Option<String>,
    pub errors: Vec<FlowError>,
    /// Identities whose call sites were left as written because they sit in
    /// an argument the bubble map replaced.
    pub skipped: Vec<String>,
}

impl ReconstructResult {
    fn failed(errors: Vec<FlowError>) -> Self {
        Self {
            success: false,
            errors,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
    /// The rewritten site and every site spliced into it.
    identities: Vec<String>,
}

/// A call site in the current source paired with its bubble map entry.
struct Planned<'b> {
    entry: &'b BubbleCallSite,
    start: usize,
    end: usize,
    /// Parameters as written, with their byte ranges.
    written: Vec<(ParameterValue, (usize, usize))>,
}

/// Regenerates the call sites of a flow from a bubble map.
pub struct FlowReconstructor<'r> {
    registry: &'r BubbleRegistry,
    action_method: String,
}

impl<'r> FlowReconstructor<'r> {
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

    /// Re-derive the call sites of `source` and rewrite every site that has an
    /// entry in `bubbles`. Any type mismatch fails the whole call.
    pub fn reconstruct(&self, source: &str, bubbles: &BubbleMap) -> ReconstructResult {
        let parsed = match parse_flow(source) {
            Ok(p) => p,
            Err(err) => return ReconstructResult::failed(vec![err]),
        };

        let mut consumed: HashSet<&str> = HashSet::new();
        let mut bound: HashSet<String> = HashSet::new();
        let mut planned = vec![];
        let mut errors = vec![];

        for site in scan_call_sites(&parsed, &self.action_method) {
            let Some(descriptor) = self.registry.resolve(&site.class_name) else {
                continue;
            };
            let SiteArgs::Params(params) = site.args else {
                continue;
            };
            let entry = match &site.binding {
                // A reused name belongs to its first declaration only.
                Some(name) if !bound.insert(name.clone()) => continue,
                Some(name) => match bubbles.get(name).filter(|e| !e.is_anonymous()) {
                    Some(entry) if entry.bubble_type != descriptor.bubble_name => {
                        tracing::warn!(identity = %name, "bubble map no longer matches source");
                        errors.push(FlowError::ReconstructionMismatch {
                            identity: name.clone(),
                            expected: entry.bubble_type.clone(),
                            found: descriptor.bubble_name.clone(),
                        });
                        continue;
                    }
                    Some(entry) => entry,
                    None => continue,
                },
                None => {
                    let found = bubbles.iter().find(|e| {
                        e.is_anonymous()
                            && !consumed.contains(e.identity.as_str())
                            && e.bubble_type == descriptor.bubble_name
                            && e.class_name == site.class_name
                    });
                    match found {
                        Some(entry) => {
                            consumed.insert(entry.identity.as_str());
                            entry
                        }
                        None => continue,
                    }
                }
            };
            planned.push(Planned {
                entry,
                start: site.start,
                end: site.end,
                written: params.into_iter().zip(site.param_ranges).collect(),
            });
        }

        if !errors.is_empty() {
            return ReconstructResult::failed(errors);
        }

        let (text, skipped) = splice(source, &planned, &self.action_method);
        for identity in &skipped {
            tracing::warn!(identity = %identity, "call site inside a replaced argument left unchanged");
        }
        ReconstructResult {
            success: true,
            new_source_text: Some(text),
            errors: vec![],
            skipped,
        }
    }
}

/// Rewrite every planned site. Sites nested in another site's argument are
/// rewritten inside that argument's text first, then the outer call is rendered.
fn splice(source: &str, planned: &[Planned<'_>], action_method: &str) -> (String, Vec<String>) {
    let mut order: Vec<usize> = (0..planned.len()).collect();
    order.sort_by_key(|&i| (planned[i].start, Reverse(planned[i].end)));

    let mut parent: Vec<Option<usize>> = vec![None; planned.len()];
    let mut open: Vec<usize> = vec![];
    for &i in &order {
        while open.last().is_some_and(|&top| planned[i].start >= planned[top].end) {
            open.pop();
        }
        parent[i] = open.last().copied();
        open.push(i);
    }

    // Innermost first, so each site is rendered after everything inside it.
    let mut rendered: Vec<Option<Edit>> = planned.iter().map(|_| None).collect();
    let mut skipped = vec![];
    for &i in order.iter().rev() {
        let children: Vec<Edit> = order
            .iter()
            .filter(|&&j| parent[j] == Some(i))
            .filter_map(|&j| rendered[j].take())
            .collect();
        rendered[i] = Some(render_planned(&planned[i], children, action_method, &mut skipped));
    }

    let top: Vec<Edit> = order
        .iter()
        .filter(|&&i| parent[i].is_none())
        .filter_map(|&i| rendered[i].take())
        .collect();
    (apply_edits(source, top), skipped)
}

/// Render one site with its nested rewrites applied to the parameters that
/// contain them. A nested site whose parameter was replaced in the map is skipped.
fn render_planned(
    site: &Planned<'_>,
    children: Vec<Edit>,
    action_method: &str,
    skipped: &mut Vec<String>,
) -> Edit {
    let mut entry = site.entry.clone();
    let mut identities = vec![entry.identity.clone()];
    let mut nested: BTreeMap<usize, Vec<Edit>> = BTreeMap::new();

    for child in children {
        let slot = site
            .written
            .iter()
            .find(|(_, (lo, hi))| *lo <= child.start && child.end <= *hi)
            .and_then(|(written, (lo, _))| {
                entry
                    .parameters
                    .iter()
                    .position(|p| p.name == written.name && p.value == written.value)
                    .map(|k| (k, *lo))
            });
        match slot {
            Some((k, base)) => {
                identities.extend(child.identities.iter().cloned());
                nested.entry(k).or_default().push(Edit {
                    start: child.start - base,
                    end: child.end - base,
                    ..child
                });
            }
            None => skipped.extend(child.identities),
        }
    }

    for (k, edits) in nested {
        let param = &mut entry.parameters[k];
        param.value = match &param.value {
            ParamValue::Source(text) => ParamValue::Source(apply_edits(text, edits)),
            ParamValue::Property(text) => ParamValue::Property(apply_edits(text, edits)),
            other => other.clone(),
        };
    }

    Edit {
        start: site.start,
        end: site.end,
        text: render_call(&entry, action_method),
        identities,
    }
}

/// Apply non-overlapping edits back to front so earlier offsets stay valid.
fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| Reverse(e.start));
    tracing::debug!(edits = edits.len(), "rewriting call sites");

    let mut out = source.to_string();
    for edit in &edits {
        out.replace_range(edit.start..edit.end, &edit.text);
    }
    out
}

// -----------------------------------------------------------------------------
// Rendering
// -----------------------------------------------------------------------------

/// `[await ]new ClassName({ p1: v1, ... })[.action()]`
pub fn render_call(site: &BubbleCallSite, action_method: &str) -> String {
    let mut out = String::new();
    if site.is_awaited {
        out.push_str("await ");
    }
    out.push_str("new ");
    out.push_str(&site.class_name);
    out.push('(');
    out.push_str(&render_object(&site.parameters));
    out.push(')');
    if site.has_action_call {
        out.push('.');
        out.push_str(action_method);
        out.push_str("()");
    }
    out
}

fn render_object(params: &[ParameterValue]) -> String {
    if params.is_empty() {
        return "{}".to_string();
    }
    let body: Vec<String> = params.iter().map(render_property).collect();
    format!("{{ {} }}", body.join(", "))
}

fn render_property(param: &ParameterValue) -> String {
    match &param.value {
        ParamValue::Property(raw) => raw.clone(),
        value => format!("{}: {}", render_key(&param.name), render_value(value)),
    }
}

pub fn render_key(name: &str) -> String {
    if IDENT_RE.is_match(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn render_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Source(text) | ParamValue::Property(text) => text.clone(),
        ParamValue::Text(text) if looks_like_literal(text) => text.clone(),
        ParamValue::Text(text) => quote(text),
        ParamValue::Data(v) => serde_json::to_string(v).unwrap_or_else(|_| "null".to_string()),
    }
}

fn looks_like_literal(text: &str) -> bool {
    LITERAL_START_RE.is_match(text) || LITERAL_KEYWORDS.contains(&text)
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}
