use super::{credential_format::ClaimFormatDesignation, object::TypedParameter};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions are objects embedded within target
/// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim) negotiation
/// formats that express how the inputs presented as proofs to a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) are
/// provided in accordance with the requirements specified in a
/// [PresentationDefinition](super::presentation_definition::PresentationDefinition).
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: String,
    definition_id: DescriptorMapId,
    descriptor_map: Vec<DescriptorMap>,
}

impl TypedParameter for PresentationSubmission {
    const KEY: &'static str = "presentation_submission";
}

impl PresentationSubmission {
    /// The presentation submission MUST contain an `id`, the `definition_id` of the
    /// presentation definition it answers, and a `descriptor_map`.
    pub fn new(id: String, definition_id: DescriptorMapId, descriptor_map: Vec<DescriptorMap>) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    /// Return the id of the presentation submission.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Return the definition id of the presentation submission.
    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    /// Return the descriptor map of the presentation submission.
    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = anyhow::Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        // Some wallets post the submission as a JSON-encoded string.
        match raw {
            Json::String(encoded) => serde_json::from_str(&encoded).map_err(Into::into),
            raw => serde_json::from_value(raw).map_err(Into::into),
        }
    }
}

impl TryFrom<PresentationSubmission> for Json {
    type Error = serde_json::Error;

    fn try_from(value: PresentationSubmission) -> Result<Self, Self::Error> {
        serde_json::to_value(value)
    }
}

/// Descriptor Maps are objects used to describe the information a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) provides to a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    pub path: JsonPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: impl Into<ClaimFormatDesignation>,
        path: JsonPath,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            path,
            path_nested: None,
        }
    }

    /// Set the nested path of the descriptor map.
    ///
    /// The `id` property MUST be the same for each level of nesting.
    pub fn set_path_nested(mut self, mut path_nested: DescriptorMap) -> Self {
        path_nested.id.clone_from(&self.id);
        self.path_nested = Some(Box::new(path_nested));
        self
    }
}
