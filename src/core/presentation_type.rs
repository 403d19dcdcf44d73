use super::{parameters::IdTokenType, presentation_definition::PresentationDefinition};

/// What the verifier asks the wallet to present.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationType {
    IdTokenRequest {
        id_token_types: Vec<IdTokenType>,
    },
    VpTokenRequest {
        presentation_definition: PresentationDefinition,
    },
    IdAndVpTokenRequest {
        id_token_types: Vec<IdTokenType>,
        presentation_definition: PresentationDefinition,
    },
}

impl PresentationType {
    pub fn id_token_types(&self) -> &[IdTokenType] {
        match self {
            PresentationType::IdTokenRequest { id_token_types }
            | PresentationType::IdAndVpTokenRequest { id_token_types, .. } => id_token_types,
            PresentationType::VpTokenRequest { .. } => &[],
        }
    }

    pub fn presentation_definition(&self) -> Option<&PresentationDefinition> {
        match self {
            PresentationType::IdTokenRequest { .. } => None,
            PresentationType::VpTokenRequest {
                presentation_definition,
            }
            | PresentationType::IdAndVpTokenRequest {
                presentation_definition,
                ..
            } => Some(presentation_definition),
        }
    }

    /// The OAuth `response_type` that matches this request.
    pub fn response_type(&self) -> &'static str {
        match self {
            PresentationType::IdTokenRequest { .. } => "id_token",
            PresentationType::VpTokenRequest { .. } => "vp_token",
            PresentationType::IdAndVpTokenRequest { .. } => "vp_token id_token",
        }
    }
}
