//! Claim format designations, as registered in the
//! [claim format registry](https://identity.foundation/claim-format-registry/#registry).

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Claim formats keyed by designation, e.g. the `vp_formats` client metadata
/// or the `format` of a presentation definition.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// Algorithms or proof types accepted for one claim format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    #[serde(rename = "alg_values_supported")]
    AlgValuesSupported(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    /// Format-specific parameters, kept as posted.
    #[serde(untagged)]
    Other(serde_json::Value),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClaimFormatDesignation {
    JwtVcJson,
    JwtVpJson,
    LdpVc,
    LdpVp,
    /// ISO/IEC 18013-5 mobile documents.
    MsoMDoc,
    /// SD-JWT VC under its legacy media type.
    VcSdJwt,
    DcSdJwt,
    Other(String),
}

const KNOWN: [(ClaimFormatDesignation, &str); 7] = [
    (ClaimFormatDesignation::JwtVcJson, "jwt_vc_json"),
    (ClaimFormatDesignation::JwtVpJson, "jwt_vp_json"),
    (ClaimFormatDesignation::LdpVc, "ldp_vc"),
    (ClaimFormatDesignation::LdpVp, "ldp_vp"),
    (ClaimFormatDesignation::MsoMDoc, "mso_mdoc"),
    (ClaimFormatDesignation::VcSdJwt, "vc+sd-jwt"),
    (ClaimFormatDesignation::DcSdJwt, "dc+sd-jwt"),
];

impl ClaimFormatDesignation {
    pub fn name(&self) -> &str {
        match self {
            Self::Other(name) => name,
            known => KNOWN
                .iter()
                .find(|(designation, _)| designation == known)
                .map(|(_, name)| *name)
                .unwrap_or_default(),
        }
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(name: &str) -> Self {
        KNOWN
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(designation, _)| designation.clone())
            .unwrap_or_else(|| Self::Other(name.to_owned()))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(name: String) -> Self {
        match Self::from(name.as_str()) {
            Self::Other(_) => Self::Other(name),
            known => known,
        }
    }
}

impl From<ClaimFormatDesignation> for String {
    fn from(designation: ClaimFormatDesignation) -> Self {
        match designation {
            ClaimFormatDesignation::Other(name) => name,
            known => known.name().to_owned(),
        }
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}
