use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// An untyped (JSON) Object from which [TypedParameters](TypedParameter) can be parsed.
///
/// Holds the claim set of a decrypted authorization response, or the form
/// parameters of a `direct_post` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A strongly typed parameter that can be read from an authorization response.
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + TryInto<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    /// Get a [TypedParameter] from the Object.
    ///
    /// Note that this method clones the underlying data.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        Some(T::try_from(self.0.get(T::KEY)?.clone()))
    }

    /// Get an optional [TypedParameter], treating `null` like an absent entry.
    pub fn get_optional<T: TypedParameter>(&self) -> Result<Option<T>> {
        match self.0.get(T::KEY) {
            None | Some(Json::Null) => Ok(None),
            Some(value) => T::try_from(value.clone()).parsing_error().map(Some),
        }
    }

    /// Insert a [TypedParameter], replacing any previous entry under the same key.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Result<()> {
        let value: Json = t
            .try_into()
            .map_err(|_| anyhow::anyhow!("'{}' could not be serialized", T::KEY))?;
        self.0.insert(T::KEY.to_owned(), value);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<Map<String, Json>> for UntypedObject {
    fn from(claims: Map<String, Json>) -> Self {
        Self(claims)
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        value.0.into()
    }
}

pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' is missing", T::KEY))?
            .context(format!("'{}' could not be parsed", T::KEY))
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' could not be parsed", T::KEY))
    }
}
