use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{
    credential_format::ClaimFormatMap,
    identifiers::RequestId,
    jarm::JarmOption,
    keys::EphemeralKeyCurve,
    parameters::{EmbedOption, ResponseModeOption},
    signing::SigningConfig,
};

/// Default lifetime of a request object, in seconds.
pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// Configuration of a verifier deployment.
#[derive(Deserialize, Debug, Clone)]
pub struct VerifierConfig {
    pub client_id_scheme: ClientIdScheme,
    pub signing: SigningConfig,
    pub public_url: BaseUrl,
    #[serde(default)]
    pub response_mode: ResponseModeOption,
    #[serde(default = "by_value")]
    pub presentation_definition_mode: EmbedOption<RequestId>,
    #[serde(default = "by_value")]
    pub request_jar_mode: EmbedOption<RequestId>,
    /// How long, in seconds, a request may wait for the wallet before it
    /// is timed out.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    pub client_metadata: ClientMetaData,
}

fn by_value() -> EmbedOption<RequestId> {
    EmbedOption::ByValue
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

impl VerifierConfig {
    /// Parses a JSON configuration document.
    ///
    /// The signing key is imported while parsing, so a configuration whose
    /// key does not match its declared algorithm never loads.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn client_id(&self) -> &str {
        self.client_id_scheme.client_id()
    }

    pub fn max_age(&self) -> chrono::TimeDelta {
        i64::try_from(self.max_age_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// How the verifier identifies itself to wallets.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ClientIdScheme {
    PreRegistered { client_id: String },
    X509SanDns { client_id: String },
    X509SanUri { client_id: String },
}

impl ClientIdScheme {
    pub fn client_id(&self) -> &str {
        match self {
            ClientIdScheme::PreRegistered { client_id }
            | ClientIdScheme::X509SanDns { client_id }
            | ClientIdScheme::X509SanUri { client_id } => client_id,
        }
    }
}

/// Client metadata advertised to wallets with each request.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ClientMetaData {
    pub jarm_option: JarmOption,
    #[serde(default)]
    pub ephemeral_key_curve: EphemeralKeyCurve,
    #[serde(default)]
    pub vp_formats: ClaimFormatMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<String>,
    #[serde(default)]
    pub subject_syntax_types_supported: Vec<String>,
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Serialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl From<BaseUrl> for String {
    fn from(value: BaseUrl) -> Self {
        value.0.into()
    }
}
