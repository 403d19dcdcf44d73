//! Opaque identifiers and key payloads attached to a presentation transaction.

use std::fmt;

use josekit::{jwk::Jwk, JoseError};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::utils::random_token;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub const LABEL: &'static str = $label;

            /// Wraps `value`, rejecting empty strings.
            pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(IdentifierError::Empty(Self::LABEL));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

identifier!(
    /// Identifies a presentation transaction towards the verifier's front end.
    TransactionId,
    "transaction_id"
);

identifier!(
    /// Identifies a presentation transaction towards the wallet. It is also used
    /// as the `state` of the authorization request.
    RequestId,
    "request_id"
);

identifier!(Nonce, "nonce");

identifier!(
    /// One-time code handed to the wallet when the verifier's front end is
    /// redirected, so that only that front end can fetch the wallet response.
    ResponseCode,
    "response_code"
);

identifier!(
    /// Serialized private half of an ephemeral ECDH key pair, in JWK form.
    ///
    /// Held only until the transaction's JARM response has been decrypted.
    EphemeralEcdhPrivateJwk,
    "ephemeral_ecdh_private_jwk"
);

identifier!(
    /// Serialized public half of an ephemeral ECDH key pair, in JWK form.
    EphemeralEcdhPublicJwk,
    "ephemeral_ecdh_public_jwk"
);

impl TransactionId {
    pub fn generate() -> Self {
        Self(random_token())
    }
}

impl RequestId {
    pub fn generate() -> Self {
        Self(random_token())
    }
}

impl ResponseCode {
    pub fn generate() -> Self {
        Self(random_token())
    }

    /// Compares in constant time for codes of equal length.
    pub fn matches(&self, presented: &ResponseCode) -> bool {
        self.0.as_bytes().ct_eq(presented.0.as_bytes()).into()
    }
}

impl EphemeralEcdhPrivateJwk {
    pub(crate) fn from_jwk(jwk: &Jwk) -> Self {
        Self(jwk.to_string())
    }

    pub fn to_jwk(&self) -> Result<Jwk, JoseError> {
        Jwk::from_bytes(self.0.as_bytes())
    }
}

impl EphemeralEcdhPublicJwk {
    pub(crate) fn from_jwk(jwk: &Jwk) -> Self {
        Self(jwk.to_string())
    }

    pub fn to_jwk(&self) -> Result<Jwk, JoseError> {
        Jwk::from_bytes(self.0.as_bytes())
    }
}
