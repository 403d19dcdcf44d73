use crate::core::object::TypedParameter;

use anyhow::{bail, Error};
use serde_json::Value as Json;

pub use crate::core::presentation_submission::PresentationSubmission;

/// `state` of the authorization request, echoed back by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State(pub String);

impl TypedParameter for State {
    const KEY: &'static str = "state";
}

impl TryFrom<Json> for State {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<State> for Json {
    fn from(value: State) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdToken(pub String);

impl TypedParameter for IdToken {
    const KEY: &'static str = "id_token";
}

impl TryFrom<Json> for IdToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map(Self).map_err(Into::into)
    }
}

impl From<IdToken> for Json {
    fn from(value: IdToken) -> Self {
        value.0.into()
    }
}

/// The `vp_token` response parameter.
///
/// A VP token is either a JSON string (e.g. a JWT or an SD-JWT) or a JSON
/// object/array (e.g. a Linked Data Proof presentation). Non-string tokens are
/// kept as their compact JSON text so that they can be handed on verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpToken(pub String);

impl TypedParameter for VpToken {
    const KEY: &'static str = "vp_token";
}

impl TryFrom<Json> for VpToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::String(s) => Ok(Self(s)),
            Json::Object(_) | Json::Array(_) => Ok(Self(value.to_string())),
            _ => bail!("Invalid vp_token"),
        }
    }
}

impl From<VpToken> for Json {
    fn from(value: VpToken) -> Self {
        Json::String(value.0)
    }
}

/// `error` code of an authorization error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError(pub String);

impl TypedParameter for ResponseError {
    const KEY: &'static str = "error";
}

impl TryFrom<Json> for ResponseError {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<ResponseError> for Json {
    fn from(value: ResponseError) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescription(pub String);

impl TypedParameter for ErrorDescription {
    const KEY: &'static str = "error_description";
}

impl TryFrom<Json> for ErrorDescription {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<ErrorDescription> for Json {
    fn from(value: ErrorDescription) -> Self {
        Json::String(value.0)
    }
}

/// The `response` parameter of a `direct_post.jwt` post: the JARM JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarmResponse(pub String);

impl TypedParameter for JarmResponse {
    const KEY: &'static str = "response";
}

impl TryFrom<Json> for JarmResponse {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<JarmResponse> for Json {
    fn from(value: JarmResponse) -> Self {
        Json::String(value.0)
    }
}
