//! JSON wire form of presentations.
//!
//! Keys are snake_case and every union carries a `__type` discriminator.
//! Decoding walks the document by hand so that a failure names the exact
//! field, what was expected there and what was found.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value as Json};
use thiserror::Error;

use super::{
    identifiers::{
        EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk, IdentifierError, Nonce, RequestId, ResponseCode, TransactionId,
    },
    parameters::{
        EmbedOption, GetWalletResponseMethod, IdTokenType, ResponseModeOption, UrlBuilder,
    },
    presentation::{
        OrderingError, Presentation, RequestObjectRetrieved, Requested, Submitted, TimedOut,
    },
    presentation_definition::PresentationDefinition,
    presentation_submission::PresentationSubmission,
    presentation_type::PresentationType,
    response::{ResponseValidationError, WalletResponse},
};

const TYPE: &str = "__type";

/// A wire document does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: expected {expected}, received {received}")]
pub struct WireError {
    /// JSONPath-like location of the offending value, e.g. `$.type.__type`.
    pub path: String,
    pub expected: String,
    pub received: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FromWireError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("{path}: {source}")]
    Identifier {
        path: String,
        #[source]
        source: IdentifierError,
    },
    #[error("{path}: {source}")]
    Response {
        path: String,
        #[source]
        source: ResponseValidationError,
    },
    #[error(transparent)]
    Ordering(#[from] OrderingError),
}

fn describe(value: Option<&Json>) -> String {
    match value {
        None => "nothing".into(),
        Some(Json::Null) => "null".into(),
        Some(Json::Bool(_)) => "a boolean".into(),
        Some(Json::Number(_)) => "a number".into(),
        Some(Json::String(s)) => format!("{s:?}"),
        Some(Json::Array(_)) => "an array".into(),
        Some(Json::Object(_)) => "an object".into(),
    }
}

fn one_of(names: &[&str]) -> String {
    let names: Vec<String> = names.iter().map(|name| format!("{name:?}")).collect();
    format!("one of {}", names.join(", "))
}

fn timestamp_to_json(at: DateTime<Utc>) -> Json {
    Json::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// A JSON object being decoded, together with its location.
struct Fields<'a> {
    map: &'a Map<String, Json>,
    path: String,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Json, path: String) -> Result<Self, WireError> {
        match value {
            Json::Object(map) => Ok(Self { map, path }),
            other => Err(WireError {
                path,
                expected: "an object".into(),
                received: describe(Some(other)),
            }),
        }
    }

    fn path(&self, key: &str) -> String {
        format!("{}.{key}", self.path)
    }

    fn error(&self, key: &str, expected: impl Into<String>) -> WireError {
        WireError {
            path: self.path(key),
            expected: expected.into(),
            received: describe(self.map.get(key)),
        }
    }

    /// `None` when the key is absent or `null`.
    fn optional(&self, key: &str) -> Option<&'a Json> {
        self.map.get(key).filter(|value| !value.is_null())
    }

    fn discriminator(&self, expected: &[&str]) -> Result<&'a str, WireError> {
        match self.map.get(TYPE).and_then(Json::as_str) {
            Some(name) if expected.contains(&name) => Ok(name),
            _ => Err(self.error(TYPE, one_of(expected))),
        }
    }

    fn string(&self, key: &str) -> Result<&'a str, WireError> {
        self.map
            .get(key)
            .and_then(Json::as_str)
            .ok_or_else(|| self.error(key, "a string"))
    }

    fn optional_string(&self, key: &str) -> Result<Option<&'a str>, WireError> {
        match self.optional(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.error(key, "a string")),
        }
    }

    fn object(&self, key: &str) -> Result<Fields<'a>, WireError> {
        let value = self.map.get(key).ok_or_else(|| self.error(key, "an object"))?;
        Fields::new(value, self.path(key))
    }

    fn identifier<T>(&self, key: &str) -> Result<T, FromWireError>
    where
        T: TryFrom<String, Error = IdentifierError>,
    {
        T::try_from(self.string(key)?.to_owned()).map_err(|source| FromWireError::Identifier {
            path: self.path(key),
            source,
        })
    }

    fn optional_identifier<T>(&self, key: &str) -> Result<Option<T>, FromWireError>
    where
        T: TryFrom<String, Error = IdentifierError>,
    {
        match self.optional(key) {
            None => Ok(None),
            Some(_) => self.identifier(key).map(Some),
        }
    }

    fn timestamp(&self, key: &str) -> Result<DateTime<Utc>, WireError> {
        let value = self.string(key).map_err(|_| self.error(key, "an RFC 3339 timestamp"))?;
        DateTime::parse_from_rfc3339(value)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|_| self.error(key, "an RFC 3339 timestamp"))
    }

    fn optional_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, WireError> {
        match self.optional(key) {
            None => Ok(None),
            Some(_) => self.timestamp(key).map(Some),
        }
    }

    /// Decodes a payload whose shape is owned by its serde implementation.
    fn decode<T: DeserializeOwned>(&self, key: &str, expected: &str) -> Result<T, WireError> {
        let value = self.map.get(key).ok_or_else(|| self.error(key, expected))?;
        serde_json::from_value(value.clone()).map_err(|e| WireError {
            path: self.path(key),
            expected: expected.into(),
            received: format!("an invalid value ({e})"),
        })
    }
}

const ID_TOKEN_REQUEST: &str = "IdTokenRequest";
const VP_TOKEN_REQUEST: &str = "VpTokenRequest";
const ID_AND_VP_TOKEN_REQUEST: &str = "IdAndVpTokenRequest";

impl PresentationType {
    pub fn to_json(&self) -> Result<Json, serde_json::Error> {
        Ok(match self {
            PresentationType::IdTokenRequest { id_token_types } => json!({
                TYPE: ID_TOKEN_REQUEST,
                "id_token_type": id_token_types,
            }),
            PresentationType::VpTokenRequest {
                presentation_definition,
            } => json!({
                TYPE: VP_TOKEN_REQUEST,
                "presentation_definition": serde_json::to_value(presentation_definition)?,
            }),
            PresentationType::IdAndVpTokenRequest {
                id_token_types,
                presentation_definition,
            } => json!({
                TYPE: ID_AND_VP_TOKEN_REQUEST,
                "id_token_type": id_token_types,
                "presentation_definition": serde_json::to_value(presentation_definition)?,
            }),
        })
    }

    fn from_fields(fields: &Fields) -> Result<Self, FromWireError> {
        let id_token_types = || -> Result<Vec<IdTokenType>, WireError> {
            let key = "id_token_type";
            let values = fields
                .map
                .get(key)
                .and_then(Json::as_array)
                .ok_or_else(|| fields.error(key, "an array of id token types"))?;
            values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    value
                        .as_str()
                        .and_then(|s| s.parse::<IdTokenType>().ok())
                        .ok_or_else(|| WireError {
                            path: format!("{}[{i}]", fields.path(key)),
                            expected: one_of(&IdTokenType::ALL),
                            received: describe(Some(value)),
                        })
                })
                .collect()
        };
        let presentation_definition = || -> Result<PresentationDefinition, WireError> {
            fields.decode("presentation_definition", "a presentation definition")
        };

        let presentation_type = match fields.discriminator(&[
            ID_TOKEN_REQUEST,
            VP_TOKEN_REQUEST,
            ID_AND_VP_TOKEN_REQUEST,
        ])? {
            ID_TOKEN_REQUEST => PresentationType::IdTokenRequest {
                id_token_types: id_token_types()?,
            },
            VP_TOKEN_REQUEST => PresentationType::VpTokenRequest {
                presentation_definition: presentation_definition()?,
            },
            _ => PresentationType::IdAndVpTokenRequest {
                id_token_types: id_token_types()?,
                presentation_definition: presentation_definition()?,
            },
        };
        Ok(presentation_type)
    }

    pub fn from_json(value: &Json) -> Result<Self, FromWireError> {
        Self::from_fields(&Fields::new(value, "$".into())?)
    }
}

const ID_TOKEN: &str = "IdToken";
const VP_TOKEN: &str = "VpToken";
const ID_AND_VP_TOKEN: &str = "IdAndVpToken";
const WALLET_RESPONSE_ERROR: &str = "WalletResponseError";

impl WalletResponse {
    pub fn to_json(&self) -> Result<Json, serde_json::Error> {
        Ok(match self {
            WalletResponse::IdToken { id_token } => json!({
                TYPE: ID_TOKEN,
                "id_token": id_token,
            }),
            WalletResponse::VpToken {
                vp_token,
                presentation_submission,
            } => json!({
                TYPE: VP_TOKEN,
                "vp_token": vp_token,
                "presentation_submission": serde_json::to_value(presentation_submission)?,
            }),
            WalletResponse::IdAndVpToken {
                id_token,
                vp_token,
                presentation_submission,
            } => json!({
                TYPE: ID_AND_VP_TOKEN,
                "id_token": id_token,
                "vp_token": vp_token,
                "presentation_submission": serde_json::to_value(presentation_submission)?,
            }),
            WalletResponse::Error { value, description } => {
                let mut object = json!({ TYPE: WALLET_RESPONSE_ERROR, "value": value });
                if let Some(description) = description {
                    object["description"] = json!(description);
                }
                object
            }
        })
    }

    fn from_fields(fields: &Fields) -> Result<Self, FromWireError> {
        let submission = || -> Result<PresentationSubmission, WireError> {
            fields.decode("presentation_submission", "a presentation submission")
        };
        let validated = |key: &str, result: Result<Self, ResponseValidationError>| {
            result.map_err(|source| FromWireError::Response {
                path: fields.path(key),
                source,
            })
        };

        match fields.discriminator(&[ID_TOKEN, VP_TOKEN, ID_AND_VP_TOKEN, WALLET_RESPONSE_ERROR])? {
            ID_TOKEN => validated(
                "id_token",
                WalletResponse::id_token(fields.string("id_token")?.to_owned()),
            ),
            VP_TOKEN => validated(
                "vp_token",
                WalletResponse::vp_token(fields.string("vp_token")?.to_owned(), submission()?),
            ),
            ID_AND_VP_TOKEN => {
                let id_token = fields.string("id_token")?.to_owned();
                let vp_token = fields.string("vp_token")?.to_owned();
                let key = if id_token.is_empty() { "id_token" } else { "vp_token" };
                validated(
                    key,
                    WalletResponse::id_and_vp_token(id_token, vp_token, submission()?),
                )
            }
            _ => validated(
                "value",
                WalletResponse::error(
                    fields.string("value")?.to_owned(),
                    fields.optional_string("description")?.map(str::to_owned),
                ),
            ),
        }
    }

    pub fn from_json(value: &Json) -> Result<Self, FromWireError> {
        Self::from_fields(&Fields::new(value, "$".into())?)
    }
}

const POLL: &str = "Poll";
const REDIRECT: &str = "Redirect";

impl GetWalletResponseMethod {
    pub fn to_json(&self) -> Json {
        match self {
            GetWalletResponseMethod::Poll => json!({ TYPE: POLL }),
            GetWalletResponseMethod::Redirect {
                redirect_uri_template,
            } => json!({
                TYPE: REDIRECT,
                "redirect_uri_template": redirect_uri_template,
            }),
        }
    }

    fn from_fields(fields: &Fields) -> Result<Self, WireError> {
        match fields.discriminator(&[POLL, REDIRECT])? {
            POLL => Ok(GetWalletResponseMethod::Poll),
            _ => Ok(GetWalletResponseMethod::Redirect {
                redirect_uri_template: fields.string("redirect_uri_template")?.to_owned(),
            }),
        }
    }
}

const BY_VALUE: &str = "ByValue";
const BY_REFERENCE: &str = "ByReference";

impl EmbedOption<RequestId> {
    pub fn to_json(&self) -> Json {
        match self {
            EmbedOption::ByValue => json!({ TYPE: BY_VALUE }),
            EmbedOption::ByReference(builder) => json!({
                TYPE: BY_REFERENCE,
                "location": builder.location().as_str(),
            }),
        }
    }

    fn from_fields(fields: &Fields) -> Result<Self, WireError> {
        match fields.discriminator(&[BY_VALUE, BY_REFERENCE])? {
            BY_VALUE => Ok(EmbedOption::ByValue),
            _ => {
                let location = fields.string("location")?;
                let location = location
                    .to_owned()
                    .try_into()
                    .map_err(|_| fields.error("location", "an absolute URL"))?;
                Ok(EmbedOption::ByReference(UrlBuilder::new(location)))
            }
        }
    }
}

const REQUESTED: &str = "Requested";
const REQUEST_OBJECT_RETRIEVED: &str = "RequestObjectRetrieved";
const SUBMITTED: &str = "Submitted";
const TIMED_OUT: &str = "TimedOut";

fn requested_to_json(
    kind: &str,
    requested: &Requested,
    retrieved_at: Option<DateTime<Utc>>,
) -> Result<Json, serde_json::Error> {
    let mut object = json!({
        TYPE: kind,
        "id": requested.id,
        "initiated_at": timestamp_to_json(requested.initiated_at),
        "type": requested.presentation_type.to_json()?,
        "request_id": requested.request_id,
        "nonce": requested.nonce,
        "response_mode": requested.response_mode,
        "presentation_definition_mode": requested.presentation_definition_mode.to_json(),
        "get_wallet_response_method": requested.get_wallet_response_method.to_json(),
    });
    if let Some(key) = &requested.ephemeral_ecdh_private_jwk {
        object["ephemeral_ecdh_private_jwk"] = json!(key);
    }
    if let Some(key) = &requested.ephemeral_ecdh_public_jwk {
        object["ephemeral_ecdh_public_jwk"] = json!(key);
    }
    if let Some(at) = retrieved_at {
        object["request_object_retrieved_at"] = timestamp_to_json(at);
    }
    Ok(object)
}

fn requested_from_fields(fields: &Fields) -> Result<Requested, FromWireError> {
    let response_mode = fields
        .string("response_mode")
        .ok()
        .and_then(|mode| mode.parse::<ResponseModeOption>().ok())
        .ok_or_else(|| fields.error("response_mode", one_of(&ResponseModeOption::ALL)))?;

    Ok(Requested {
        id: fields.identifier::<TransactionId>("id")?,
        initiated_at: fields.timestamp("initiated_at")?,
        presentation_type: PresentationType::from_fields(&fields.object("type")?)?,
        request_id: fields.identifier::<RequestId>("request_id")?,
        nonce: fields.identifier::<Nonce>("nonce")?,
        ephemeral_ecdh_private_jwk: fields
            .optional_identifier::<EphemeralEcdhPrivateJwk>("ephemeral_ecdh_private_jwk")?,
        ephemeral_ecdh_public_jwk: fields
            .optional_identifier::<EphemeralEcdhPublicJwk>("ephemeral_ecdh_public_jwk")?,
        response_mode,
        presentation_definition_mode: EmbedOption::from_fields(
            &fields.object("presentation_definition_mode")?,
        )?,
        get_wallet_response_method: GetWalletResponseMethod::from_fields(
            &fields.object("get_wallet_response_method")?,
        )?,
    })
}

impl Presentation {
    /// Encodes the presentation in its wire form.
    ///
    /// Only the embedded presentation definition and submission go through
    /// serde, so the error is practically unreachable.
    pub fn to_json(&self) -> Result<Json, serde_json::Error> {
        match self {
            Presentation::Requested(requested) => requested_to_json(REQUESTED, requested, None),
            Presentation::RequestObjectRetrieved(retrieved) => {
                let requested = Requested {
                    id: retrieved.id().clone(),
                    initiated_at: retrieved.initiated_at(),
                    presentation_type: retrieved.presentation_type().clone(),
                    request_id: retrieved.request_id().clone(),
                    nonce: retrieved.nonce().clone(),
                    ephemeral_ecdh_private_jwk: retrieved.ephemeral_ecdh_private_jwk().cloned(),
                    ephemeral_ecdh_public_jwk: retrieved.ephemeral_ecdh_public_jwk().cloned(),
                    response_mode: retrieved.response_mode(),
                    presentation_definition_mode: retrieved.presentation_definition_mode().clone(),
                    get_wallet_response_method: retrieved.get_wallet_response_method().clone(),
                };
                requested_to_json(
                    REQUEST_OBJECT_RETRIEVED,
                    &requested,
                    Some(retrieved.request_object_retrieved_at()),
                )
            }
            Presentation::Submitted(submitted) => {
                let mut object = json!({
                    TYPE: SUBMITTED,
                    "id": submitted.id(),
                    "initiated_at": timestamp_to_json(submitted.initiated_at()),
                    "type": submitted.presentation_type().to_json()?,
                    "request_id": submitted.request_id(),
                    "request_object_retrieved_at":
                        timestamp_to_json(submitted.request_object_retrieved_at()),
                    "submitted_at": timestamp_to_json(submitted.submitted_at()),
                    "wallet_response": submitted.wallet_response().to_json()?,
                    "nonce": submitted.nonce(),
                });
                if let Some(code) = submitted.response_code() {
                    object["response_code"] = json!(code);
                }
                Ok(object)
            }
            Presentation::TimedOut(timed_out) => {
                let mut object = json!({
                    TYPE: TIMED_OUT,
                    "id": timed_out.id(),
                    "initiated_at": timestamp_to_json(timed_out.initiated_at()),
                    "type": timed_out.presentation_type().to_json()?,
                    "timed_out_at": timestamp_to_json(timed_out.timed_out_at()),
                });
                if let Some(at) = timed_out.request_object_retrieved_at() {
                    object["request_object_retrieved_at"] = timestamp_to_json(at);
                }
                if let Some(at) = timed_out.submitted_at() {
                    object["submitted_at"] = timestamp_to_json(at);
                }
                Ok(object)
            }
        }
    }

    /// Decodes a presentation, re-checking every state invariant.
    pub fn from_json(value: &Json) -> Result<Self, FromWireError> {
        let fields = Fields::new(value, "$".into())?;

        let presentation: Presentation = match fields.discriminator(&[
            REQUESTED,
            REQUEST_OBJECT_RETRIEVED,
            SUBMITTED,
            TIMED_OUT,
        ])? {
            REQUESTED => requested_from_fields(&fields)?.into(),
            REQUEST_OBJECT_RETRIEVED => RequestObjectRetrieved::new(
                requested_from_fields(&fields)?,
                fields.timestamp("request_object_retrieved_at")?,
            )?
            .into(),
            SUBMITTED => Submitted::new(
                fields.identifier("id")?,
                fields.timestamp("initiated_at")?,
                PresentationType::from_fields(&fields.object("type")?)?,
                fields.identifier("request_id")?,
                fields.identifier("nonce")?,
                fields.timestamp("request_object_retrieved_at")?,
                fields.timestamp("submitted_at")?,
                WalletResponse::from_fields(&fields.object("wallet_response")?)?,
                fields.optional_identifier::<ResponseCode>("response_code")?,
            )?
            .into(),
            _ => TimedOut::new(
                fields.identifier("id")?,
                fields.timestamp("initiated_at")?,
                PresentationType::from_fields(&fields.object("type")?)?,
                fields.optional_timestamp("request_object_retrieved_at")?,
                fields.optional_timestamp("submitted_at")?,
                fields.timestamp("timed_out_at")?,
            )?
            .into(),
        };
        Ok(presentation)
    }
}
