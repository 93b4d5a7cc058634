use serde::{Deserialize, Serialize};
use std::fmt;

// -----------------------------------------------------------------------------
// Credential types
// -----------------------------------------------------------------------------

/// Closed set of secret categories a bubble can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    OpenaiCred,
    GoogleGeminiCred,
    AnthropicCred,
    OpenrouterCred,
    FirecrawlApiKey,
    ResendCred,
    SlackCred,
    DatabaseCred,
    GithubToken,
    CloudflareR2AccessKey,
    CloudflareR2SecretKey,
    CloudflareR2Account,
    ApifyCred,
    GoogleDriveCred,
    GmailCred,
    GoogleSheetsCred,
    GoogleCalendarCred,
    NotionCred,
    AmazonCred,
    LinkedinCred,
}

impl CredentialType {
    pub const ALL: [CredentialType; 20] = [
        CredentialType::OpenaiCred,
        CredentialType::GoogleGeminiCred,
        CredentialType::AnthropicCred,
        CredentialType::OpenrouterCred,
        CredentialType::FirecrawlApiKey,
        CredentialType::ResendCred,
        CredentialType::SlackCred,
        CredentialType::DatabaseCred,
        CredentialType::GithubToken,
        CredentialType::CloudflareR2AccessKey,
        CredentialType::CloudflareR2SecretKey,
        CredentialType::CloudflareR2Account,
        CredentialType::ApifyCred,
        CredentialType::GoogleDriveCred,
        CredentialType::GmailCred,
        CredentialType::GoogleSheetsCred,
        CredentialType::GoogleCalendarCred,
        CredentialType::NotionCred,
        CredentialType::AmazonCred,
        CredentialType::LinkedinCred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::OpenaiCred => "OPENAI_CRED",
            CredentialType::GoogleGeminiCred => "GOOGLE_GEMINI_CRED",
            CredentialType::AnthropicCred => "ANTHROPIC_CRED",
            CredentialType::OpenrouterCred => "OPENROUTER_CRED",
            CredentialType::FirecrawlApiKey => "FIRECRAWL_API_KEY",
            CredentialType::ResendCred => "RESEND_CRED",
            CredentialType::SlackCred => "SLACK_CRED",
            CredentialType::DatabaseCred => "DATABASE_CRED",
            CredentialType::GithubToken => "GITHUB_TOKEN",
            CredentialType::CloudflareR2AccessKey => "CLOUDFLARE_R2_ACCESS_KEY",
            CredentialType::CloudflareR2SecretKey => "CLOUDFLARE_R2_SECRET_KEY",
            CredentialType::CloudflareR2Account => "CLOUDFLARE_R2_ACCOUNT",
            CredentialType::ApifyCred => "APIFY_CRED",
            CredentialType::GoogleDriveCred => "GOOGLE_DRIVE_CRED",
            CredentialType::GmailCred => "GMAIL_CRED",
            CredentialType::GoogleSheetsCred => "GOOGLE_SHEETS_CRED",
            CredentialType::GoogleCalendarCred => "GOOGLE_CALENDAR_CRED",
            CredentialType::NotionCred => "NOTION_CRED",
            CredentialType::AmazonCred => "AMAZON_CRED",
            CredentialType::LinkedinCred => "LINKEDIN_CRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Refreshable tokens obtained through the OAuth token provider.
    pub fn is_oauth(self) -> bool {
        matches!(
            self,
            CredentialType::GoogleDriveCred
                | CredentialType::GmailCred
                | CredentialType::GoogleSheetsCred
                | CredentialType::GoogleCalendarCred
                | CredentialType::NotionCred
        )
    }

    /// Captured browser sessions (context id + cookies).
    pub fn is_browser_session(self) -> bool {
        matches!(self, CredentialType::AmazonCred | CredentialType::LinkedinCred)
    }

    /// Types the operator can provide a default for.
    pub fn is_system_managed(self) -> bool {
        self.default_env_var().is_some()
    }

    pub fn default_env_var(self) -> Option<&'static str> {
        match self {
            CredentialType::OpenaiCred => Some("OPENAI_API_KEY"),
            CredentialType::GoogleGeminiCred => Some("GOOGLE_API_KEY"),
            CredentialType::AnthropicCred => Some("ANTHROPIC_API_KEY"),
            CredentialType::OpenrouterCred => Some("OPENROUTER_API_KEY"),
            CredentialType::FirecrawlApiKey => Some("FIRECRAWL_API_KEY"),
            CredentialType::ResendCred => Some("RESEND_API_KEY"),
            CredentialType::CloudflareR2AccessKey => Some("CLOUDFLARE_R2_ACCESS_KEY"),
            CredentialType::CloudflareR2SecretKey => Some("CLOUDFLARE_R2_SECRET_KEY"),
            CredentialType::CloudflareR2Account => Some("CLOUDFLARE_R2_ACCOUNT_ID"),
            CredentialType::ApifyCred => Some("APIFY_API_TOKEN"),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// Grants & resolved values
// -----------------------------------------------------------------------------

/// Audit-only origin tag of a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    System,
    User,
    OauthRefreshed,
    BrowserSession,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::System => "system",
            Provenance::User => "user",
            Provenance::OauthRefreshed => "oauth-refreshed",
            Provenance::BrowserSession => "browser-session",
        })
    }
}

/// A caller-supplied secret aimed at one bubble identity.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialGrant {
    pub target_identity: String,
    pub credential_type: CredentialType,
    #[serde(default)]
    pub secret_text: String,
    #[serde(default)]
    pub external_credential_id: Option<String>,
    #[serde(default)]
    pub aux_metadata: Option<serde_json::Value>,
}

impl CredentialGrant {
    pub fn user(target: impl Into<String>, credential_type: CredentialType, secret: impl Into<String>) -> Self {
        Self {
            target_identity: target.into(),
            credential_type,
            secret_text: secret.into(),
            external_credential_id: None,
            aux_metadata: None,
        }
    }

    pub fn external(target: impl Into<String>, credential_type: CredentialType, external_id: impl Into<String>) -> Self {
        Self {
            target_identity: target.into(),
            credential_type,
            secret_text: String::new(),
            external_credential_id: Some(external_id.into()),
            aux_metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.aux_metadata = Some(metadata);
        self
    }
}

// Secrets stay out of Debug output.
impl fmt::Debug for CredentialGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGrant")
            .field("target_identity", &self.target_identity)
            .field("credential_type", &self.credential_type)
            .field("secret_text", &"<redacted>")
            .field("external_credential_id", &self.external_credential_id)
            .field("has_aux_metadata", &self.aux_metadata.is_some())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub credential_type: CredentialType,
    pub value: String,
    pub provenance: Provenance,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("credential_type", &self.credential_type)
            .field("value", &"<redacted>")
            .field("provenance", &self.provenance)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Browser sessions
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionData {
    pub context_id: String,
    pub cookies: Vec<BrowserCookie>,
}

// -----------------------------------------------------------------------------
// Escaping
// -----------------------------------------------------------------------------

/// Escape a secret so it can sit between double quotes in flow source.
pub fn escape_secret(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
