use indexmap::IndexMap;
use serde::ser::SerializeStruct;
use serde::Serialize;
use std::fmt;

/// Name of the parameter that carries injected secrets.
pub const CREDENTIALS_PARAM: &str = "credentials";

// -----------------------------------------------------------------------------
// Parameters
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    EnvironmentReference,
    Unknown,
}

/// How a parameter value is held in memory.
#[derive(Clone, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub enum ParamValue {
    /// Exact source text of the value expression; re-emitted byte for byte.
    Source(String),
    /// A plain in-memory string; quoted on output unless it already reads as a literal.
    Text(String),
    /// Structured data produced by the resolver, written out as a data literal.
    Data(serde_json::Value),
    /// A whole property the scanner does not model (spread, method, computed key).
    Property(String),
}

#[derive(Clone, PartialEq)]
pub struct ParameterValue {
    pub name: String,
    pub kind: ParamKind,
    pub value: ParamValue,
}

impl ParameterValue {
    pub fn from_source(name: impl Into<String>, kind: ParamKind, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: ParamValue::Source(text.into()),
        }
    }

    /// The verbatim source text, if this value came from the flow.
    pub fn literal_text(&self) -> Option<&str> {
        match &self.value {
            ParamValue::Source(s) => Some(s),
            _ => None,
        }
    }

    fn is_secret(&self) -> bool {
        self.name == CREDENTIALS_PARAM
    }
}

impl fmt::Debug for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ParameterValue");
        d.field("name", &self.name).field("kind", &self.kind);
        if self.is_secret() {
            d.field("value", &"<redacted>");
        } else {
            match &self.value {
                ParamValue::Source(s) => d.field("source", s),
                ParamValue::Text(s) => d.field("text", s),
                ParamValue::Data(v) => d.field("data", v),
                ParamValue::Property(s) => d.field("property", s),
            };
        }
        d.finish()
    }
}

// Injected secrets never leave the process through serialization.
impl Serialize for ParameterValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("ParameterValue", 3)?;
        st.serialize_field("name", &self.name)?;
        st.serialize_field("kind", &self.kind)?;
        if self.is_secret() {
            st.serialize_field("value", "<redacted>")?;
        } else {
            match &self.value {
                ParamValue::Source(s) | ParamValue::Text(s) | ParamValue::Property(s) => {
                    st.serialize_field("value", s)?
                }
                ParamValue::Data(v) => st.serialize_field("value", v)?,
            }
        }
        st.end()
    }
}

// -----------------------------------------------------------------------------
// Call sites
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleCallSite {
    /// Binding name, or `_anonymous_<ClassName>_<n>`.
    pub identity: String,
    pub binding: Option<String>,
    pub bubble_type: String,
    pub class_name: String,
    pub parameters: Vec<ParameterValue>,
    pub is_awaited: bool,
    pub has_action_call: bool,
    /// Byte range of the instantiation expression (wrappers included).
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl BubbleCallSite {
    pub fn anonymous_identity(class_name: &str, ordinal: usize) -> String {
        format!("_anonymous_{class_name}_{ordinal}")
    }

    pub fn is_anonymous(&self) -> bool {
        self.binding.is_none()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Replace the parameter with the same name in place, or append it.
    pub fn upsert_parameter(&mut self, param: ParameterValue) {
        match self.parameters.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.parameters.push(param),
        }
    }
}

/// Call sites keyed by identity, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BubbleMap {
    sites: IndexMap<String, BubbleCallSite>,
}

impl BubbleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the existing entry) when the identity is taken.
    pub fn insert(&mut self, site: BubbleCallSite) -> bool {
        if self.sites.contains_key(&site.identity) {
            return false;
        }
        self.sites.insert(site.identity.clone(), site);
        true
    }

    pub fn get(&self, identity: &str) -> Option<&BubbleCallSite> {
        self.sites.get(identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut BubbleCallSite> {
        self.sites.get_mut(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sites.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BubbleCallSite> {
        self.sites.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BubbleCallSite> {
        self.sites.values_mut()
    }
}

impl FromIterator<BubbleCallSite> for BubbleMap {
    fn from_iter<T: IntoIterator<Item = BubbleCallSite>>(iter: T) -> Self {
        let mut map = BubbleMap::new();
        for site in iter {
            map.insert(site);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(identity: &str) -> BubbleCallSite {
        BubbleCallSite {
            identity: identity.to_string(),
            binding: None,
            bubble_type: "slack".to_string(),
            class_name: "SlackBubble".to_string(),
            parameters: vec![],
            is_awaited: false,
            has_action_call: false,
            start: 0,
            end: 0,
            start_line: 1,
            end_line: 1,
        }
    }

    #[test]
    fn map_keeps_document_order_past_ten_entries() {
        let map: BubbleMap = (0..12)
            .map(|i| site(&BubbleCallSite::anonymous_identity("SlackBubble", i)))
            .collect();
        let ids: Vec<_> = map.identities().collect();
        assert_eq!(ids[2], "_anonymous_SlackBubble_2");
        assert_eq!(ids[10], "_anonymous_SlackBubble_10");
    }

    #[test]
    fn insert_refuses_duplicate_identity() {
        let mut map = BubbleMap::new();
        assert!(map.insert(site("a")));
        assert!(!map.insert(site("a")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut s = site("a");
        s.parameters.push(ParameterValue::from_source("message", ParamKind::String, "'hi'"));
        s.parameters.push(ParameterValue::from_source("credentials", ParamKind::Object, "{}"));
        s.parameters.push(ParameterValue::from_source("channel", ParamKind::String, "'c'"));
        s.upsert_parameter(ParameterValue::from_source(
            "credentials",
            ParamKind::Object,
            "{ SLACK_CRED: \"x\" }",
        ));
        let names: Vec<_> = s.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["message", "credentials", "channel"]);
        assert_eq!(s.parameter("credentials").unwrap().literal_text(), Some("{ SLACK_CRED: \"x\" }"));
    }

    #[test]
    fn credentials_are_redacted_in_debug_and_json() {
        let p = ParameterValue::from_source("credentials", ParamKind::Object, "{ SLACK_CRED: \"xoxb\" }");
        assert!(!format!("{p:?}").contains("xoxb"));
        assert!(!serde_json::to_string(&p).unwrap().contains("xoxb"));
    }
}
