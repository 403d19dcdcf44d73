use josekit::{
    jwk::alg::ec::{EcCurve, EcKeyPair},
    JoseError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    identifiers::{EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk},
    jwe::KeyManagementAlgorithm,
};

/// Curve of the ephemeral ECDH keys handed to wallets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EphemeralKeyCurve {
    #[default]
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
}

impl From<EphemeralKeyCurve> for EcCurve {
    fn from(curve: EphemeralKeyCurve) -> Self {
        match curve {
            EphemeralKeyCurve::P256 => EcCurve::P256,
            EphemeralKeyCurve::P384 => EcCurve::P384,
            EphemeralKeyCurve::P521 => EcCurve::P521,
        }
    }
}

/// Generates a fresh ECDH key pair for one transaction.
///
/// Both halves carry a random `kid`, `use: "enc"` and `alg`, so the wallet
/// encrypts with exactly `alg` and the private half refuses any other.
pub fn generate_ephemeral_key_pair(
    curve: EphemeralKeyCurve,
    alg: KeyManagementAlgorithm,
) -> Result<(EphemeralEcdhPrivateJwk, EphemeralEcdhPublicJwk), JoseError> {
    let key_pair = EcKeyPair::generate(curve.into())?;
    let kid = Uuid::new_v4().to_string();

    let mut private = key_pair.to_jwk_key_pair();
    let mut public = key_pair.to_jwk_public_key();
    for jwk in [&mut private, &mut public] {
        jwk.set_key_id(&kid);
        jwk.set_key_use("enc");
        jwk.set_algorithm(alg.name());
    }

    Ok((
        EphemeralEcdhPrivateJwk::from_jwk(&private),
        EphemeralEcdhPublicJwk::from_jwk(&public),
    ))
}
