use std::{fmt, marker::PhantomData, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::BaseUrl;

use super::identifiers::ResponseCode;

const DIRECT_POST: &str = "direct_post";
const DIRECT_POST_JWT: &str = "direct_post.jwt";

const SUBJECT_SIGNED_ID_TOKEN: &str = "subject_signed_id_token";
const ATTESTER_SIGNED_ID_TOKEN: &str = "attester_signed_id_token";

/// Token that a redirect URI template must contain. It is replaced by the
/// transaction's [ResponseCode].
pub const RESPONSE_CODE_PLACEHOLDER: &str = "{RESPONSE_CODE}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// How the wallet delivers its authorization response to the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResponseModeOption {
    /// The `direct_post` response mode: parameters are form-posted in clear.
    DirectPost,
    /// The `direct_post.jwt` response mode: parameters are posted as a JARM JWT.
    #[default]
    DirectPostJwt,
}

impl ResponseModeOption {
    pub const ALL: [&'static str; 2] = [DIRECT_POST, DIRECT_POST_JWT];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModeOption::DirectPost => DIRECT_POST,
            ResponseModeOption::DirectPostJwt => DIRECT_POST_JWT,
        }
    }
}

impl FromStr for ResponseModeOption {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            DIRECT_POST => Ok(ResponseModeOption::DirectPost),
            DIRECT_POST_JWT => Ok(ResponseModeOption::DirectPostJwt),
            _ => Err(UnknownValue {
                kind: "response mode",
                value: s.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for ResponseModeOption {
    type Error = UnknownValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResponseModeOption> for String {
    fn from(rm: ResponseModeOption) -> Self {
        rm.as_str().into()
    }
}

impl fmt::Display for ResponseModeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Kind of ID token the verifier asks the wallet for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdTokenType {
    SubjectSigned,
    AttesterSigned,
}

impl IdTokenType {
    pub const ALL: [&'static str; 2] = [SUBJECT_SIGNED_ID_TOKEN, ATTESTER_SIGNED_ID_TOKEN];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdTokenType::SubjectSigned => SUBJECT_SIGNED_ID_TOKEN,
            IdTokenType::AttesterSigned => ATTESTER_SIGNED_ID_TOKEN,
        }
    }
}

impl FromStr for IdTokenType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SUBJECT_SIGNED_ID_TOKEN => Ok(IdTokenType::SubjectSigned),
            ATTESTER_SIGNED_ID_TOKEN => Ok(IdTokenType::AttesterSigned),
            _ => Err(UnknownValue {
                kind: "id token type",
                value: s.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for IdTokenType {
    type Error = UnknownValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IdTokenType> for String {
    fn from(t: IdTokenType) -> Self {
        t.as_str().into()
    }
}

impl fmt::Display for IdTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Builds the URL under which an artifact identified by a `T` can be fetched.
pub trait BuildUrl<T> {
    fn build_url(&self, id: &T) -> Result<Url, url::ParseError>;
}

/// Resolves artifact ids relative to a fixed location, e.g.
/// `https://verifier.example.com/request.jwt/` + `<request id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct UrlBuilder<T> {
    location: BaseUrl,
    #[serde(skip)]
    id: PhantomData<fn(&T)>,
}

impl<T> UrlBuilder<T> {
    pub fn new(location: BaseUrl) -> Self {
        Self {
            location,
            id: PhantomData,
        }
    }

    pub fn location(&self) -> &BaseUrl {
        &self.location
    }
}

impl<T: AsRef<str>> BuildUrl<T> for UrlBuilder<T> {
    fn build_url(&self, id: &T) -> Result<Url, url::ParseError> {
        self.location.join(id.as_ref())
    }
}

/// Whether an artifact is embedded in the authorization request or passed
/// by reference through a URL derived from an id of type `T`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", bound = "")]
pub enum EmbedOption<T> {
    ByValue,
    ByReference(UrlBuilder<T>),
}

impl<T: AsRef<str>> EmbedOption<T> {
    /// Returns the reference URL for `id`, or `None` when embedding by value.
    pub fn reference_url(&self, id: &T) -> Option<Result<Url, url::ParseError>> {
        match self {
            EmbedOption::ByValue => None,
            EmbedOption::ByReference(builder) => Some(builder.build_url(id)),
        }
    }
}

#[derive(Debug, Error)]
pub enum RedirectUriError {
    #[error("redirect URI template does not contain the {{RESPONSE_CODE}} placeholder")]
    MissingPlaceholder,
    #[error("redirect URI is not a valid URI: {0}")]
    InvalidUri(#[from] url::ParseError),
}

/// Substitutes `response_code` into `template` and parses the result.
pub fn render_redirect_uri(
    template: &str,
    response_code: &ResponseCode,
) -> Result<Url, RedirectUriError> {
    if !template.contains(RESPONSE_CODE_PLACEHOLDER) {
        return Err(RedirectUriError::MissingPlaceholder);
    }
    let uri = template.replace(RESPONSE_CODE_PLACEHOLDER, response_code.as_str());
    Ok(Url::parse(&uri)?)
}

/// How the verifier's front end learns about the wallet response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GetWalletResponseMethod {
    /// The front end polls the verifier.
    Poll,
    /// The wallet redirects the user agent to the front end, carrying a
    /// response code that unlocks the wallet response.
    Redirect { redirect_uri_template: String },
}

impl GetWalletResponseMethod {
    /// Renders the redirect URI for `response_code`, or `None` when polling.
    pub fn redirect_uri(&self, response_code: &ResponseCode) -> Option<Result<Url, RedirectUriError>> {
        match self {
            GetWalletResponseMethod::Poll => None,
            GetWalletResponseMethod::Redirect {
                redirect_uri_template,
            } => Some(render_redirect_uri(redirect_uri_template, response_code)),
        }
    }
}
