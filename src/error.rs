use serde::ser::SerializeStruct;
use serde::Serialize;

use crate::credential::CredentialType;

/// Everything that can go wrong between reading a flow and handing back rewritten source.
///
/// Entry points fold these into their result structs instead of returning `Err`,
/// so one response can carry every problem found in a flow.
#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    #[error(
        "unknown bubble class '{class_name}'. Registered bubble classes: {}",
        .registered.join(", ")
    )]
    UnregisteredBubbleType {
        class_name: String,
        registered: Vec<String>,
    },
    #[error("credential provider failed for {credential_type} on '{identity}': {message}")]
    CredentialProvider {
        credential_type: CredentialType,
        identity: String,
        message: String,
    },
    #[error("bubble '{identity}' was recorded as '{expected}' but the source now declares '{found}'")]
    ReconstructionMismatch {
        identity: String,
        expected: String,
        found: String,
    },
    #[error("bubble '{identity}' sits inside an argument that was replaced; its call site was left unchanged")]
    SiteNotRewritten { identity: String },
    #[error("invalid bubble registry: {0}")]
    InvalidRegistry(String),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FlowError {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Syntax { .. } => "syntax",
            FlowError::UnregisteredBubbleType { .. } => "unregisteredBubbleType",
            FlowError::CredentialProvider { .. } => "credentialProvider",
            FlowError::ReconstructionMismatch { .. } => "reconstructionMismatch",
            FlowError::SiteNotRewritten { .. } => "siteNotRewritten",
            FlowError::InvalidRegistry(_) => "invalidRegistry",
            FlowError::Serde(_) => "serde",
        }
    }
}

// Serialized as `{ kind, message }` for the flow service's JSON responses.
impl Serialize for FlowError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("FlowError", 2)?;
        st.serialize_field("kind", self.kind())?;
        st.serialize_field("message", &self.to_string())?;
        st.end()
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_message_lists_every_registered_class() {
        let err = FlowError::UnregisteredBubbleType {
            class_name: "FooBubble".to_string(),
            registered: vec!["AIAgentBubble".to_string(), "SlackBubble".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'FooBubble'"));
        assert!(msg.ends_with("AIAgentBubble, SlackBubble"));
    }

    #[test]
    fn errors_serialize_as_kind_and_message() {
        let err = FlowError::ReconstructionMismatch {
            identity: "slack".to_string(),
            expected: "slack".to_string(),
            found: "http".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "reconstructionMismatch");
        assert!(json["message"].as_str().unwrap().contains("'http'"));
    }
}
