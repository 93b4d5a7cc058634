use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::credential::CredentialType;
use crate::error::{FlowError, FlowResult};

static BUILTIN_CATALOG: &str = include_str!("../catalog/bubbles.json");

static BUILTIN: LazyLock<BubbleRegistry> = LazyLock::new(|| {
    BubbleRegistry::from_json(BUILTIN_CATALOG).unwrap_or_else(|err| {
        tracing::error!(error = %err, "built-in bubble catalog failed to load");
        BubbleRegistry::default()
    })
});

/// What the core needs to know about one bubble type. Never behavior, only metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleDescriptor {
    pub class_name: String,
    pub bubble_name: String,
    #[serde(default)]
    pub credential_types: Vec<CredentialType>,
    /// The bubble declares nested tools whose credentials it needs as well.
    #[serde(default)]
    pub tool_introspection: bool,
}

/// Read-only lookup from class identifier or bubble name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct BubbleRegistry {
    descriptors: Vec<BubbleDescriptor>,
    by_class: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl BubbleRegistry {
    /// The process-wide registry built from the embedded catalog. Initialized at most once.
    pub fn builtin() -> &'static BubbleRegistry {
        &BUILTIN
    }

    pub fn from_json(raw: &str) -> FlowResult<Self> {
        let descriptors: Vec<BubbleDescriptor> = serde_json::from_str(raw)?;
        Self::from_descriptors(descriptors)
    }

    pub fn from_descriptors(descriptors: Vec<BubbleDescriptor>) -> FlowResult<Self> {
        let mut by_class = HashMap::new();
        let mut by_name = HashMap::new();
        for (idx, d) in descriptors.iter().enumerate() {
            if d.class_name.is_empty() || d.bubble_name.is_empty() {
                return Err(FlowError::InvalidRegistry(format!(
                    "descriptor #{idx} has an empty class or bubble name"
                )));
            }
            if by_class.insert(d.class_name.clone(), idx).is_some() {
                return Err(FlowError::InvalidRegistry(format!(
                    "duplicate class name '{}'",
                    d.class_name
                )));
            }
            if by_name.insert(d.bubble_name.clone(), idx).is_some() {
                return Err(FlowError::InvalidRegistry(format!(
                    "duplicate bubble name '{}'",
                    d.bubble_name
                )));
            }
        }
        Ok(Self {
            descriptors,
            by_class,
            by_name,
        })
    }

    /// Resolve the class identifier of a call site.
    pub fn resolve(&self, class_name: &str) -> Option<&BubbleDescriptor> {
        self.by_class.get(class_name).map(|&idx| &self.descriptors[idx])
    }

    pub fn by_bubble_name(&self, bubble_name: &str) -> Option<&BubbleDescriptor> {
        self.by_name.get(bubble_name).map(|&idx| &self.descriptors[idx])
    }

    /// Resolve a tool declaration. Tools are named by bubble name; class names
    /// are accepted too.
    pub fn resolve_tool(&self, name: &str) -> Option<&BubbleDescriptor> {
        self.by_bubble_name(name).or_else(|| self.resolve(name))
    }

    /// Credential types a declared tool needs.
    pub fn accepted_credential_types(&self, name: &str) -> &[CredentialType] {
        self.resolve_tool(name)
            .map(|d| d.credential_types.as_slice())
            .unwrap_or(&[])
    }

    /// Registered class names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.iter().map(|d| d.class_name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
