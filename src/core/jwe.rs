use std::{fmt, str::FromStr};

use anyhow::{bail, Context, Result};
use base64::prelude::*;
use josekit::{
    jwe::{JweHeader, ECDH_ES, ECDH_ES_A128KW, ECDH_ES_A192KW, ECDH_ES_A256KW},
    jwk::Jwk,
    jwt::{decode_with_decrypter, encode_with_encrypter, JwtPayload},
    JoseError,
};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use super::parameters::UnknownValue;

/// Default content encryption algorithm per OID4VP v1.0 §8.3.
pub const DEFAULT_ENC: &str = "A128GCM";

/// ECDH-ES key management algorithms accepted for encrypted responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyManagementAlgorithm {
    EcdhEs,
    EcdhEsA128Kw,
    EcdhEsA192Kw,
    EcdhEsA256Kw,
}

impl KeyManagementAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            KeyManagementAlgorithm::EcdhEs => "ECDH-ES",
            KeyManagementAlgorithm::EcdhEsA128Kw => "ECDH-ES+A128KW",
            KeyManagementAlgorithm::EcdhEsA192Kw => "ECDH-ES+A192KW",
            KeyManagementAlgorithm::EcdhEsA256Kw => "ECDH-ES+A256KW",
        }
    }

    /// Encrypts `payload` as a compact JWT to `recipient_key`.
    fn encrypt(&self, payload: &JwtPayload, header: &JweHeader, recipient_key: &Jwk) -> Result<String, JoseError> {
        match self {
            KeyManagementAlgorithm::EcdhEs => {
                encode_with_encrypter(payload, header, &ECDH_ES.encrypter_from_jwk(recipient_key)?)
            }
            KeyManagementAlgorithm::EcdhEsA128Kw => encode_with_encrypter(
                payload,
                header,
                &ECDH_ES_A128KW.encrypter_from_jwk(recipient_key)?,
            ),
            KeyManagementAlgorithm::EcdhEsA192Kw => encode_with_encrypter(
                payload,
                header,
                &ECDH_ES_A192KW.encrypter_from_jwk(recipient_key)?,
            ),
            KeyManagementAlgorithm::EcdhEsA256Kw => encode_with_encrypter(
                payload,
                header,
                &ECDH_ES_A256KW.encrypter_from_jwk(recipient_key)?,
            ),
        }
    }
}

impl FromStr for KeyManagementAlgorithm {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECDH-ES" => Ok(KeyManagementAlgorithm::EcdhEs),
            "ECDH-ES+A128KW" => Ok(KeyManagementAlgorithm::EcdhEsA128Kw),
            "ECDH-ES+A192KW" => Ok(KeyManagementAlgorithm::EcdhEsA192Kw),
            "ECDH-ES+A256KW" => Ok(KeyManagementAlgorithm::EcdhEsA256Kw),
            _ => Err(UnknownValue {
                kind: "key management algorithm",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

/// Content encryption algorithms accepted for encrypted responses.
pub const CONTENT_ENCRYPTION_ALGORITHMS: [&str; 6] = [
    "A128CBC-HS256",
    "A192CBC-HS384",
    "A256CBC-HS512",
    "A128GCM",
    "A192GCM",
    "A256GCM",
];

/// A compact JWE could not even be read far enough to try decrypting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed JWE: {0}")]
pub struct MalformedJwe(pub &'static str);

/// Decodes the protected header of a compact JWE without decrypting it.
pub fn protected_header(compact: &str) -> Result<Map<String, Json>, MalformedJwe> {
    let parts: Vec<&str> = compact.split('.').collect();
    if parts.len() != 5 {
        return Err(MalformedJwe("expected five dot-separated parts"));
    }
    let header = BASE64_URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|_| MalformedJwe("protected header is not base64url"))?;
    match serde_json::from_slice(&header) {
        Ok(Json::Object(header)) => Ok(header),
        _ => Err(MalformedJwe("protected header is not a JSON object")),
    }
}

/// Decrypts a compact JWT with `private_key` and returns its claim set.
///
/// The caller is expected to have checked the protected header against the
/// negotiated algorithms; the key management algorithm is enforced again
/// here by the decrypter.
pub fn decrypt_compact(
    compact: &str,
    alg: KeyManagementAlgorithm,
    private_key: &Jwk,
) -> Result<Map<String, Json>, DecryptError> {
    let (payload, _header) = match alg {
        KeyManagementAlgorithm::EcdhEs => decode_with_decrypter(
            compact,
            &ECDH_ES
                .decrypter_from_jwk(private_key)
                .map_err(DecryptError::InvalidKey)?,
        ),
        KeyManagementAlgorithm::EcdhEsA128Kw => decode_with_decrypter(
            compact,
            &ECDH_ES_A128KW
                .decrypter_from_jwk(private_key)
                .map_err(DecryptError::InvalidKey)?,
        ),
        KeyManagementAlgorithm::EcdhEsA192Kw => decode_with_decrypter(
            compact,
            &ECDH_ES_A192KW
                .decrypter_from_jwk(private_key)
                .map_err(DecryptError::InvalidKey)?,
        ),
        KeyManagementAlgorithm::EcdhEsA256Kw => decode_with_decrypter(
            compact,
            &ECDH_ES_A256KW
                .decrypter_from_jwk(private_key)
                .map_err(DecryptError::InvalidKey)?,
        ),
    }
    .map_err(DecryptError::Decryption)?;

    Ok(payload.claims_set().clone())
}

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("decryption key rejected: {0}")]
    InvalidKey(#[source] JoseError),
    #[error("JWE could not be decrypted: {0}")]
    Decryption(#[source] JoseError),
}

/// Builder for creating JWE-encrypted authorization responses.
///
/// Per OID4VP v1.0 §8.3:
/// - The `alg` parameter MUST be present in the JWK and the JWE `alg` MUST equal it
/// - The `enc` is obtained from `encrypted_response_enc_values_supported` (default: A128GCM)
/// - If the JWK has a `kid`, the JWE MUST include it in the header
#[derive(Debug, Clone, Default)]
pub struct JweBuilder {
    payload: Option<Json>,
    recipient_key: Option<Jwk>,
    alg: Option<String>,
    enc: Option<String>,
    kid: Option<String>,
}

impl JweBuilder {
    /// Creates a new JWE builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload to encrypt.
    ///
    /// The payload should be a JSON object containing the authorization response
    /// parameters (e.g., `vp_token`, `state`).
    pub fn payload(mut self, payload: Json) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the recipient's public key for encryption.
    pub fn recipient_key(mut self, jwk: Jwk) -> Self {
        self.recipient_key = Some(jwk);
        self
    }

    /// Sets the key agreement algorithm.
    ///
    /// When the recipient JWK carries an `alg`, this MUST be equal to it.
    pub fn alg(mut self, alg: impl Into<String>) -> Self {
        self.alg = Some(alg.into());
        self
    }

    /// Sets the content encryption algorithm (default: "A128GCM").
    pub fn enc(mut self, enc: impl Into<String>) -> Self {
        self.enc = Some(enc.into());
        self
    }

    /// Sets the key ID (kid) header parameter.
    pub fn kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Builds the JWE string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The payload or the recipient key is not set
    /// - The algorithm is not set, or is not one of the ECDH-ES family
    /// - Encryption fails
    pub fn build(self) -> Result<String> {
        let payload = self.payload.context("payload is required")?;
        let recipient_key = self.recipient_key.context("recipient_key is required")?;
        let alg = self.alg.context("alg is required")?;
        let enc = self.enc.unwrap_or_else(|| DEFAULT_ENC.to_string());

        let alg: KeyManagementAlgorithm = alg.parse()?;

        let mut jwt_payload = JwtPayload::new();
        if let Json::Object(map) = payload {
            for (key, value) in map {
                jwt_payload.set_claim(&key, Some(value))?;
            }
        } else {
            bail!("payload must be a JSON object");
        }

        let mut header = JweHeader::new();
        header.set_token_type("JWT");
        header.set_algorithm(alg.name());
        header.set_content_encryption(&enc);

        if let Some(kid) = &self.kid {
            header.set_key_id(kid);
        } else if let Some(kid) = recipient_key.key_id() {
            header.set_key_id(kid);
        }

        let jwe = alg.encrypt(&jwt_payload, &header, &recipient_key)?;
        tracing::debug!("JWE built with alg={alg}, enc={enc}");

        Ok(jwe)
    }
}
