use anyhow::Error;
use thiserror::Error as ThisError;

use self::parameters::{
    ErrorDescription, IdToken, JarmResponse, PresentationSubmission, ResponseError, State, VpToken,
};

use super::{
    object::{ParsingErrorContext, TypedParameter, UntypedObject},
    parameters::ResponseModeOption,
    presentation_type::PresentationType,
};

pub mod parameters;

/// Parameters of an authorization response, either form-posted in clear
/// (`direct_post`) or recovered from the claim set of a JARM JWT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizationResponseData {
    pub state: Option<String>,
    pub id_token: Option<String>,
    pub vp_token: Option<String>,
    pub presentation_submission: Option<PresentationSubmission>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TryFrom<UntypedObject> for AuthorizationResponseData {
    type Error = Error;

    /// Copies the known response parameters out of `value`. A malformed
    /// `presentation_submission` is an error, never silently dropped.
    fn try_from(value: UntypedObject) -> Result<Self, Self::Error> {
        Ok(Self {
            state: value.get_optional::<State>()?.map(|s| s.0),
            id_token: value.get_optional::<IdToken>()?.map(|t| t.0),
            vp_token: value.get_optional::<VpToken>()?.map(|t| t.0),
            presentation_submission: value.get_optional::<PresentationSubmission>()?,
            error: value.get_optional::<ResponseError>()?.map(|e| e.0),
            error_description: value.get_optional::<ErrorDescription>()?.map(|d| d.0),
        })
    }
}

/// An authorization response as posted by the wallet.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationResponse {
    /// `direct_post`: the parameters are posted in clear.
    DirectPost(AuthorizationResponseData),
    /// `direct_post.jwt`: the parameters are wrapped in a JARM JWT.
    DirectPostJwt {
        state: Option<String>,
        response: String,
    },
}

impl AuthorizationResponse {
    /// Interprets the form parameters of a wallet post.
    ///
    /// A `response` parameter marks a `direct_post.jwt` post.
    pub fn from_parameters(params: UntypedObject) -> Result<Self, Error> {
        match params.get::<JarmResponse>() {
            Some(response) => Ok(AuthorizationResponse::DirectPostJwt {
                state: params.get_optional::<State>()?.map(|s| s.0),
                response: response.parsing_error()?.0,
            }),
            None => AuthorizationResponseData::try_from(params).map(Self::DirectPost),
        }
    }

    pub fn response_mode(&self) -> ResponseModeOption {
        match self {
            AuthorizationResponse::DirectPost(_) => ResponseModeOption::DirectPost,
            AuthorizationResponse::DirectPostJwt { .. } => ResponseModeOption::DirectPostJwt,
        }
    }

    pub fn state(&self) -> Option<&str> {
        match self {
            AuthorizationResponse::DirectPost(data) => data.state.as_deref(),
            AuthorizationResponse::DirectPostJwt { state, .. } => state.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ResponseValidationError {
    #[error("'{0}' is missing")]
    Missing(&'static str),
    #[error("'{0}' must not be empty")]
    Empty(&'static str),
}

/// The wallet's answer to a presentation request, as kept by the verifier.
///
/// Use the constructors, which reject empty tokens, rather than building
/// variants directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletResponse {
    IdToken {
        id_token: String,
    },
    VpToken {
        vp_token: String,
        presentation_submission: PresentationSubmission,
    },
    IdAndVpToken {
        id_token: String,
        vp_token: String,
        presentation_submission: PresentationSubmission,
    },
    /// The wallet declined or failed; `value` is the OAuth error code.
    Error {
        value: String,
        description: Option<String>,
    },
}

fn non_empty(value: String, key: &'static str) -> Result<String, ResponseValidationError> {
    if value.is_empty() {
        return Err(ResponseValidationError::Empty(key));
    }
    Ok(value)
}

impl WalletResponse {
    pub fn id_token(id_token: String) -> Result<Self, ResponseValidationError> {
        Ok(WalletResponse::IdToken {
            id_token: non_empty(id_token, IdToken::KEY)?,
        })
    }

    pub fn vp_token(
        vp_token: String,
        presentation_submission: PresentationSubmission,
    ) -> Result<Self, ResponseValidationError> {
        Ok(WalletResponse::VpToken {
            vp_token: non_empty(vp_token, VpToken::KEY)?,
            presentation_submission,
        })
    }

    pub fn id_and_vp_token(
        id_token: String,
        vp_token: String,
        presentation_submission: PresentationSubmission,
    ) -> Result<Self, ResponseValidationError> {
        Ok(WalletResponse::IdAndVpToken {
            id_token: non_empty(id_token, IdToken::KEY)?,
            vp_token: non_empty(vp_token, VpToken::KEY)?,
            presentation_submission,
        })
    }

    pub fn error(
        value: String,
        description: Option<String>,
    ) -> Result<Self, ResponseValidationError> {
        Ok(WalletResponse::Error {
            value: non_empty(value, ResponseError::KEY)?,
            description,
        })
    }

    /// Builds the wallet response expected for `presentation_type` out of the
    /// decoded response parameters.
    ///
    /// An `error` parameter always wins; otherwise the tokens required by the
    /// request must be present and non-empty.
    pub fn from_response_data(
        presentation_type: &PresentationType,
        data: AuthorizationResponseData,
    ) -> Result<Self, ResponseValidationError> {
        let AuthorizationResponseData {
            id_token,
            vp_token,
            presentation_submission,
            error,
            error_description,
            ..
        } = data;

        if let Some(error) = error {
            return Self::error(error, error_description);
        }

        let missing = ResponseValidationError::Missing;
        match presentation_type {
            PresentationType::IdTokenRequest { .. } => {
                Self::id_token(id_token.ok_or(missing(IdToken::KEY))?)
            }
            PresentationType::VpTokenRequest { .. } => Self::vp_token(
                vp_token.ok_or(missing(VpToken::KEY))?,
                presentation_submission.ok_or(missing(PresentationSubmission::KEY))?,
            ),
            PresentationType::IdAndVpTokenRequest { .. } => Self::id_and_vp_token(
                id_token.ok_or(missing(IdToken::KEY))?,
                vp_token.ok_or(missing(VpToken::KEY))?,
                presentation_submission.ok_or(missing(PresentationSubmission::KEY))?,
            ),
        }
    }
}
