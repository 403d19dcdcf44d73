pub mod credential_format;
pub mod identifiers;
pub mod jarm;
pub mod jwe;
pub mod keys;
pub mod object;
pub mod parameters;
pub mod presentation;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod presentation_type;
pub mod response;
pub mod signing;
pub mod wire;
