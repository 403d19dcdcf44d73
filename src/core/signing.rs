//! Validation of the verifier's static signing key.

use std::fmt;

use josekit::{
    jwk::Jwk,
    jws::{
        JwsSigner, EdDSA, ES256, ES256K, ES384, ES512, PS256, PS384, PS512, RS256, RS384, RS512,
    },
    JoseError,
};
use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningConfigError {
    #[error("invalid JWK: {0}")]
    InvalidJwk(#[source] JoseError),
    #[error("JWK does not contain a private key")]
    NotPrivate,
    #[error("algorithm from JWK: {from_jwk}, specified: {specified}")]
    AlgorithmMismatch { from_jwk: String, specified: String },
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("key cannot be used with {algorithm}: {source}")]
    Import {
        algorithm: String,
        #[source]
        source: JoseError,
    },
}

/// Infers the signing algorithm of a JWK.
///
/// An explicit `alg` wins. Otherwise EC keys on the NIST curves and Ed25519
/// OKP keys map to their only JWS algorithm; anything else is `None`.
pub fn guess_algorithm_from_jwk(jwk: &Jwk) -> Option<String> {
    if let Some(alg) = jwk.algorithm() {
        return Some(alg.to_owned());
    }
    let alg = match (jwk.key_type(), jwk.curve()) {
        ("EC", Some("P-256")) => "ES256",
        ("EC", Some("P-384")) => "ES384",
        ("EC", Some("P-521")) => "ES512",
        ("OKP", Some("Ed25519")) => "EdDSA",
        _ => return None,
    };
    Some(alg.to_owned())
}

/// Imports `jwk` as a JWS signer for `algorithm`.
fn signer(jwk: &Jwk, algorithm: &str) -> Result<Box<dyn JwsSigner>, SigningConfigError> {
    fn boxed<S: JwsSigner + 'static>(signer: S) -> Box<dyn JwsSigner> {
        Box::new(signer)
    }

    let signer = match algorithm {
        "ES256" => ES256.signer_from_jwk(jwk).map(boxed),
        "ES384" => ES384.signer_from_jwk(jwk).map(boxed),
        "ES512" => ES512.signer_from_jwk(jwk).map(boxed),
        "ES256K" => ES256K.signer_from_jwk(jwk).map(boxed),
        "EdDSA" => EdDSA.signer_from_jwk(jwk).map(boxed),
        "RS256" => RS256.signer_from_jwk(jwk).map(boxed),
        "RS384" => RS384.signer_from_jwk(jwk).map(boxed),
        "RS512" => RS512.signer_from_jwk(jwk).map(boxed),
        "PS256" => PS256.signer_from_jwk(jwk).map(boxed),
        "PS384" => PS384.signer_from_jwk(jwk).map(boxed),
        "PS512" => PS512.signer_from_jwk(jwk).map(boxed),
        other => return Err(SigningConfigError::UnsupportedAlgorithm(other.to_owned())),
    };
    signer.map_err(|source| SigningConfigError::Import {
        algorithm: algorithm.to_owned(),
        source,
    })
}

/// A private JWK, kept as its JSON text.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticSigningPrivateJwk(String);

impl StaticSigningPrivateJwk {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_jwk(&self) -> Result<Jwk, SigningConfigError> {
        Jwk::from_bytes(self.0.as_bytes()).map_err(SigningConfigError::InvalidJwk)
    }
}

impl fmt::Debug for StaticSigningPrivateJwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticSigningPrivateJwk(..)")
    }
}

/// Checks that `jwk_json` is a well-formed private JWK.
pub fn parse_static_signing_private_jwk(
    jwk_json: &str,
) -> Result<StaticSigningPrivateJwk, SigningConfigError> {
    let jwk = Jwk::from_bytes(jwk_json.as_bytes()).map_err(SigningConfigError::InvalidJwk)?;
    if jwk.parameter("d").is_none() {
        return Err(SigningConfigError::NotPrivate);
    }
    Ok(StaticSigningPrivateJwk(jwk_json.to_owned()))
}

/// The key the verifier signs request objects with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SigningConfigInput")]
pub struct SigningConfig {
    pub static_signing_private_jwk: StaticSigningPrivateJwk,
    pub algorithm: String,
}

impl SigningConfig {
    pub fn signer(&self) -> Result<Box<dyn JwsSigner>, SigningConfigError> {
        signer(&self.static_signing_private_jwk.to_jwk()?, &self.algorithm)
    }
}

/// Validates `jwk_json` for use with `algorithm`.
///
/// Fails if the algorithm inferred from the key disagrees with the declared
/// one, or if the key cannot be imported for the declared algorithm.
pub fn parse_signing_config(
    jwk_json: &str,
    algorithm: &str,
) -> Result<SigningConfig, SigningConfigError> {
    let static_signing_private_jwk = parse_static_signing_private_jwk(jwk_json)?;
    let jwk = static_signing_private_jwk.to_jwk()?;

    if let Some(from_jwk) = guess_algorithm_from_jwk(&jwk) {
        if from_jwk != algorithm {
            return Err(SigningConfigError::AlgorithmMismatch {
                from_jwk,
                specified: algorithm.to_owned(),
            });
        }
    }
    signer(&jwk, algorithm)?;

    Ok(SigningConfig {
        static_signing_private_jwk,
        algorithm: algorithm.to_owned(),
    })
}

/// Configuration form: the JWK may be inlined as an object or given as a string.
#[derive(Deserialize)]
struct SigningConfigInput {
    static_signing_private_jwk: Json,
    algorithm: String,
}

impl TryFrom<SigningConfigInput> for SigningConfig {
    type Error = SigningConfigError;

    fn try_from(input: SigningConfigInput) -> Result<Self, Self::Error> {
        let jwk = match input.static_signing_private_jwk {
            Json::String(jwk) => jwk,
            other => other.to_string(),
        };
        parse_signing_config(&jwk, &input.algorithm)
    }
}
