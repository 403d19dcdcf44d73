//! JWT-secured authorization responses (JARM).
//!
//! Only encrypted responses are accepted. Signed responses need the wallet's
//! key to be resolved, which this crate does not do, so they fail with
//! [JarmError::UnsupportedMode].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;
use tracing::debug;

use super::{
    identifiers::EphemeralEcdhPrivateJwk,
    jwe::{self, DecryptError, KeyManagementAlgorithm, MalformedJwe, CONTENT_ENCRYPTION_ALGORITHMS},
    object::UntypedObject,
    response::AuthorizationResponseData,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarmSigning {
    pub alg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarmEncryption {
    /// Key management algorithm, e.g. `ECDH-ES`.
    pub alg: String,
    /// Content encryption algorithm, e.g. `A256GCM`.
    pub enc: String,
}

/// How the wallet must protect its authorization response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JarmOption {
    Signed(JarmSigning),
    Encrypted(JarmEncryption),
    SignedAndEncrypted {
        signed: JarmSigning,
        encrypted: JarmEncryption,
    },
}

impl JarmOption {
    pub fn signing(&self) -> Option<&JarmSigning> {
        match self {
            JarmOption::Signed(signed) | JarmOption::SignedAndEncrypted { signed, .. } => {
                Some(signed)
            }
            JarmOption::Encrypted(_) => None,
        }
    }

    pub fn encryption(&self) -> Option<&JarmEncryption> {
        match self {
            JarmOption::Encrypted(encrypted)
            | JarmOption::SignedAndEncrypted { encrypted, .. } => Some(encrypted),
            JarmOption::Signed(_) => None,
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            JarmOption::Signed(_) => "signed",
            JarmOption::Encrypted(_) => "encrypted",
            JarmOption::SignedAndEncrypted { .. } => "signed and encrypted",
        }
    }
}

#[derive(Debug, Error)]
pub enum JarmError {
    #[error("{0} JARM responses are not supported")]
    UnsupportedMode(&'static str),
    #[error("no ephemeral key to decrypt the response with")]
    MissingDecryptionKey,
    #[error("unsupported JWE algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("JWE header '{header}' is {received:?}, expected '{expected}'")]
    AlgorithmMismatch {
        header: &'static str,
        expected: String,
        received: Option<String>,
    },
    #[error(transparent)]
    Malformed(#[from] MalformedJwe),
    #[error("ephemeral key could not be read: {0}")]
    InvalidKey(#[source] josekit::JoseError),
    #[error(transparent)]
    Decryption(#[from] DecryptError),
    #[error("response claims are invalid: {0:#}")]
    Claims(#[source] anyhow::Error),
}

impl JarmError {
    /// Short name of the failure, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            JarmError::UnsupportedMode(_) => "unsupported_mode",
            JarmError::MissingDecryptionKey => "missing_decryption_key",
            JarmError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            JarmError::AlgorithmMismatch { .. } => "algorithm_mismatch",
            JarmError::Malformed(_) => "malformed",
            JarmError::InvalidKey(_) => "invalid_key",
            JarmError::Decryption(_) => "decryption",
            JarmError::Claims(_) => "claims",
        }
    }
}

fn check_header(
    header: &Map<String, Json>,
    name: &'static str,
    expected: &str,
) -> Result<(), JarmError> {
    match header.get(name).and_then(Json::as_str) {
        Some(received) if received == expected => Ok(()),
        received => Err(JarmError::AlgorithmMismatch {
            header: name,
            expected: expected.to_owned(),
            received: received.map(str::to_owned),
        }),
    }
}

/// Recovers the claim set of a JARM response.
///
/// The protected header must advertise exactly the negotiated `alg` and
/// `enc` before any decryption is attempted.
pub fn decrypt_response(
    option: &JarmOption,
    ephemeral_key: Option<&EphemeralEcdhPrivateJwk>,
    jwt: &str,
) -> Result<Map<String, Json>, JarmError> {
    let encryption = match option {
        JarmOption::Encrypted(encryption) => encryption,
        JarmOption::Signed(_) | JarmOption::SignedAndEncrypted { .. } => {
            return Err(JarmError::UnsupportedMode(option.mode()))
        }
    };
    let ephemeral_key = ephemeral_key.ok_or(JarmError::MissingDecryptionKey)?;

    let alg: KeyManagementAlgorithm = encryption
        .alg
        .parse()
        .map_err(|_| JarmError::UnsupportedAlgorithm(encryption.alg.clone()))?;
    if !CONTENT_ENCRYPTION_ALGORITHMS.contains(&encryption.enc.as_str()) {
        return Err(JarmError::UnsupportedAlgorithm(encryption.enc.clone()));
    }

    let header = jwe::protected_header(jwt)?;
    check_header(&header, "alg", alg.name())?;
    check_header(&header, "enc", &encryption.enc)?;

    let key = ephemeral_key.to_jwk().map_err(JarmError::InvalidKey)?;
    debug!("decrypting JARM response with alg={alg}, enc={}", encryption.enc);
    Ok(jwe::decrypt_compact(jwt, alg, &key)?)
}

/// Runs [decrypt_response] and maps the claims to response parameters.
pub fn verify_jarm_response(
    option: &JarmOption,
    ephemeral_key: Option<&EphemeralEcdhPrivateJwk>,
    jwt: &str,
) -> Result<AuthorizationResponseData, JarmError> {
    let claims = decrypt_response(option, ephemeral_key, jwt)?;
    AuthorizationResponseData::try_from(UntypedObject::from(claims)).map_err(JarmError::Claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        identifiers::EphemeralEcdhPublicJwk,
        jwe::JweBuilder,
        keys::{generate_ephemeral_key_pair, EphemeralKeyCurve},
    };
    use serde_json::json;

    fn encrypted(alg: &str, enc: &str) -> JarmOption {
        JarmOption::Encrypted(JarmEncryption {
            alg: alg.into(),
            enc: enc.into(),
        })
    }

    fn keys(alg: KeyManagementAlgorithm) -> (EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk) {
        generate_ephemeral_key_pair(EphemeralKeyCurve::P256, alg).unwrap()
    }

    fn encrypt(public: &EphemeralEcdhPublicJwk, alg: &str, enc: &str, claims: Json) -> String {
        JweBuilder::new()
            .payload(claims)
            .recipient_key(public.to_jwk().unwrap())
            .alg(alg)
            .enc(enc)
            .build()
            .unwrap()
    }

    #[test]
    fn decrypts_to_original_claims() {
        let (private, public) = keys(KeyManagementAlgorithm::EcdhEsA256Kw);
        let claims = json!({
            "iss": "https://wallet.example.com",
            "sub": "holder",
            "aud": "verifier"
        });
        let jwt = encrypt(&public, "ECDH-ES+A256KW", "A256GCM", claims.clone());

        let decrypted = decrypt_response(
            &encrypted("ECDH-ES+A256KW", "A256GCM"),
            Some(&private),
            &jwt,
        )
        .unwrap();
        assert_eq!(Json::Object(decrypted), claims);
    }

    #[test]
    fn maps_claims_to_response_data() {
        let (private, public) = keys(KeyManagementAlgorithm::EcdhEs);
        let jwt = encrypt(
            &public,
            "ECDH-ES",
            "A128CBC-HS256",
            json!({
                "state": "req-1",
                "vp_token": "vp",
                "presentation_submission": {
                    "id": "sub",
                    "definition_id": "pd",
                    "descriptor_map": [{ "id": "mdl", "format": "mso_mdoc", "path": "$" }]
                }
            }),
        );

        let data =
            verify_jarm_response(&encrypted("ECDH-ES", "A128CBC-HS256"), Some(&private), &jwt)
                .unwrap();
        assert_eq!(data.state.as_deref(), Some("req-1"));
        assert_eq!(data.vp_token.as_deref(), Some("vp"));
        assert_eq!(data.presentation_submission.unwrap().definition_id(), "pd");
        assert!(data.id_token.is_none());
    }

    #[test]
    fn bad_submission_fails_whole_response() {
        let (private, public) = keys(KeyManagementAlgorithm::EcdhEs);
        let jwt = encrypt(
            &public,
            "ECDH-ES",
            "A128GCM",
            json!({ "vp_token": "vp", "presentation_submission": { "id": 1 } }),
        );
        let err = verify_jarm_response(&encrypted("ECDH-ES", "A128GCM"), Some(&private), &jwt)
            .unwrap_err();
        assert_eq!(err.kind(), "claims");
    }

    #[test]
    fn signed_modes_are_unsupported() {
        let signed = JarmSigning { alg: "ES256".into() };
        let err = decrypt_response(&JarmOption::Signed(signed.clone()), None, "a.b.c").unwrap_err();
        assert!(matches!(err, JarmError::UnsupportedMode("signed")));

        let (private, _) = keys(KeyManagementAlgorithm::EcdhEs);
        let both = JarmOption::SignedAndEncrypted {
            signed,
            encrypted: JarmEncryption {
                alg: "ECDH-ES".into(),
                enc: "A128GCM".into(),
            },
        };
        let err = decrypt_response(&both, Some(&private), "a.b.c.d.e").unwrap_err();
        assert!(matches!(err, JarmError::UnsupportedMode(_)));
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = decrypt_response(&encrypted("ECDH-ES", "A128GCM"), None, "a.b.c.d.e").unwrap_err();
        assert!(matches!(err, JarmError::MissingDecryptionKey));
    }

    #[test]
    fn downgraded_header_is_rejected() {
        let (private, public) = keys(KeyManagementAlgorithm::EcdhEs);
        let jwt = encrypt(&public, "ECDH-ES", "A128GCM", json!({ "state": "x" }));

        let err = decrypt_response(&encrypted("ECDH-ES", "A256GCM"), Some(&private), &jwt)
            .unwrap_err();
        assert!(matches!(
            err,
            JarmError::AlgorithmMismatch { header: "enc", .. }
        ));

        let err = decrypt_response(&encrypted("ECDH-ES+A128KW", "A128GCM"), Some(&private), &jwt)
            .unwrap_err();
        assert!(matches!(
            err,
            JarmError::AlgorithmMismatch { header: "alg", .. }
        ));
    }

    #[test]
    fn unsupported_or_malformed_input_fails() {
        let (private, _) = keys(KeyManagementAlgorithm::EcdhEs);
        assert!(matches!(
            decrypt_response(&encrypted("RSA-OAEP", "A128GCM"), Some(&private), "a.b.c.d.e"),
            Err(JarmError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            decrypt_response(&encrypted("ECDH-ES", "A128GCM"), Some(&private), "not a jwt"),
            Err(JarmError::Malformed(_))
        ));

        // A token for another key passes the header checks but cannot be opened.
        let (_, other_public) = keys(KeyManagementAlgorithm::EcdhEs);
        let jwt = encrypt(&other_public, "ECDH-ES", "A128GCM", json!({ "state": "x" }));
        assert!(matches!(
            decrypt_response(&encrypted("ECDH-ES", "A128GCM"), Some(&private), &jwt),
            Err(JarmError::Decryption(_))
        ));
    }

    #[test]
    fn option_from_config() {
        let option: JarmOption = serde_json::from_value(json!({
            "signed_and_encrypted": {
                "signed": { "alg": "ES256" },
                "encrypted": { "alg": "ECDH-ES", "enc": "A256GCM" }
            }
        }))
        .unwrap();
        assert_eq!(option.signing().unwrap().alg, "ES256");
        assert_eq!(option.encryption().unwrap().enc, "A256GCM");
    }
}
