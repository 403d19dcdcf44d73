use super::credential_format::*;
use crate::utils::NonEmptyVec;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// The verifier core carries the definition through the transaction lifecycle;
/// it does not evaluate submitted credentials against it.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: NonEmptyVec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_requirements: Option<Vec<SubmissionRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property and at least one
    /// input descriptor.
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: NonEmptyVec::new(input_descriptor),
            submission_requirements: None,
            name: None,
            purpose: None,
            format: ClaimFormatMap::new(),
        }
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition.
    pub fn input_descriptors(&self) -> &[InputDescriptor] {
        &self.input_descriptors
    }

    /// Add a rule selecting among groups of input descriptors.
    ///
    /// Without submission requirements, every input descriptor is required.
    pub fn add_submission_requirement(mut self, requirement: SubmissionRequirement) -> Self {
        self.submission_requirements
            .get_or_insert_with(Vec::new)
            .push(requirement);
        self
    }

    pub fn submission_requirements(&self) -> Option<&[SubmissionRequirement]> {
        self.submission_requirements.as_deref()
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Attach the claim formats the verifier can process.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }
}

/// Input Descriptors are objects used to describe the information a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// The `constraints` object is kept as raw JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Map<String, Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    group: Vec<String>,
}

impl InputDescriptor {
    pub fn new(id: String, constraints: Map<String, Json>) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn constraints(&self) -> &Map<String, Json> {
        &self.constraints
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    /// Place the descriptor in the groups named by submission requirements.
    pub fn set_group(mut self, group: Vec<String>) -> Self {
        self.group = group;
        self
    }

    pub fn group(&self) -> &[String] {
        &self.group
    }
}

/// A rule over the input descriptors of a definition, tagged by `rule`.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements](https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SubmissionRequirement {
    All(SubmissionRequirementBase),
    Pick(SubmissionRequirementPick),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRequirementBase {
    #[serde(flatten)]
    pub source: SubmissionRequirementSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl SubmissionRequirementBase {
    pub fn from_group(group: impl Into<String>) -> Self {
        Self {
            source: SubmissionRequirementSource::From(group.into()),
            name: None,
            purpose: None,
        }
    }
}

/// What a requirement applies to: a group of input descriptors, or further
/// requirements.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionRequirementSource {
    From(String),
    FromNested(Vec<SubmissionRequirement>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRequirementPick {
    #[serde(flatten)]
    pub submission_requirement: SubmissionRequirementBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_example() {
        let value = json!({
            "id": "36682080-c2ed-4ba6-a4cd-37c86ef2da8c",
            "input_descriptors": [
                {
                    "id": "d05a7f51-ac09-43af-8864-e00f0175f2c7",
                    "format": { "ldp_vc": { "proof_type": ["Ed25519Signature2018"] } },
                    "constraints": {
                        "fields": [
                            {
                                "path": ["$.type"],
                                "filter": { "type": "string", "pattern": "IDCardCredential" }
                            }
                        ]
                    }
                }
            ]
        });
        let definition: PresentationDefinition = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(definition.input_descriptors().len(), 1);
        assert_eq!(
            definition.input_descriptors()[0].id(),
            "d05a7f51-ac09-43af-8864-e00f0175f2c7"
        );
        assert_eq!(serde_json::to_value(&definition).unwrap(), value);
    }

    #[test]
    fn submission_requirements_survive_a_round_trip() {
        let value = json!({
            "id": "pd",
            "submission_requirements": [
                { "rule": "pick", "count": 1, "from": "A" },
                {
                    "rule": "all",
                    "name": "Proof of address",
                    "from_nested": [
                        { "rule": "pick", "min": 1, "max": 2, "from": "B" }
                    ]
                }
            ],
            "input_descriptors": [
                { "id": "a", "group": ["A"], "constraints": {} },
                { "id": "b", "group": ["A", "B"], "constraints": {} }
            ]
        });
        let definition: PresentationDefinition = serde_json::from_value(value.clone()).unwrap();

        let requirements = definition.submission_requirements().unwrap();
        assert_eq!(requirements.len(), 2);
        let SubmissionRequirement::Pick(pick) = &requirements[0] else {
            panic!("expected a pick rule, got {:?}", requirements[0]);
        };
        assert_eq!(pick.count, Some(1));
        assert_eq!(
            pick.submission_requirement.source,
            SubmissionRequirementSource::From("A".into())
        );
        assert!(matches!(
            &requirements[1],
            SubmissionRequirement::All(SubmissionRequirementBase {
                source: SubmissionRequirementSource::FromNested(nested),
                ..
            }) if nested.len() == 1
        ));
        assert_eq!(definition.input_descriptors()[1].group(), ["A", "B"]);

        assert_eq!(serde_json::to_value(&definition).unwrap(), value);
    }

    #[test]
    fn built_definition_matches_posted_json() {
        let mut format = ClaimFormatMap::new();
        format.insert(
            ClaimFormatDesignation::JwtVpJson,
            ClaimFormatPayload::Alg(vec!["ES256".into()]),
        );
        let definition = PresentationDefinition::new(
            "pd".into(),
            InputDescriptor::new("a".into(), Map::new())
                .set_name("Driving licence".into())
                .set_purpose("Age check".into())
                .set_group(vec!["A".into()]),
        )
        .add_input_descriptors(
            InputDescriptor::new("b".into(), Map::new()).set_group(vec!["A".into()]),
        )
        .add_submission_requirement(SubmissionRequirement::Pick(SubmissionRequirementPick {
            submission_requirement: SubmissionRequirementBase::from_group("A"),
            count: Some(1),
            min: None,
            max: None,
        }))
        .set_name("Over 18".into())
        .set_purpose("Age verification".into())
        .set_format(format);

        let posted: PresentationDefinition = serde_json::from_value(json!({
            "id": "pd",
            "name": "Over 18",
            "purpose": "Age verification",
            "format": { "jwt_vp_json": { "alg": ["ES256"] } },
            "submission_requirements": [{ "rule": "pick", "count": 1, "from": "A" }],
            "input_descriptors": [
                {
                    "id": "a",
                    "name": "Driving licence",
                    "purpose": "Age check",
                    "group": ["A"],
                    "constraints": {}
                },
                { "id": "b", "group": ["A"], "constraints": {} }
            ]
        }))
        .unwrap();
        assert_eq!(definition, posted);
        assert_eq!(definition.name().map(String::as_str), Some("Over 18"));
        assert_eq!(definition.purpose().map(String::as_str), Some("Age verification"));
        assert_eq!(definition.format().len(), 1);
    }

    #[test]
    fn input_descriptors_are_required() {
        let value = json!({ "id": "pd", "input_descriptors": [] });
        assert!(serde_json::from_value::<PresentationDefinition>(value).is_err());
    }
}
