use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;
use crate::error::{Error, Result};

/// The entity a feature is being checked for: a user, an organization, a request.
///
/// An actor has a stable string identifier, used for actor-gate membership and for
/// percentage-of-actors bucketing, plus arbitrary attributes that registered group predicates may
/// read. The evaluator itself never looks at the attributes.
///
/// To create an actor, use [ActorBuilder] (or [Actor::with_key]).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Actor {
    key: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, AttributeValue>,
}

impl Actor {
    /// Create a new [ActorBuilder], seeding it with the provided identifier.
    pub fn with_key(key: impl Into<String>) -> ActorBuilder {
        ActorBuilder::new(key)
    }

    /// The actor's identifier.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Reads a boolean attribute. Missing or non-boolean attributes read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.attribute(name)
            .and_then(AttributeValue::as_bool)
            .unwrap_or(false)
    }
}

/// Contains methods for building an [Actor].
///
/// The key is trimmed when the actor is built; an empty key is rejected.
pub struct ActorBuilder {
    key: String,
    attributes: HashMap<String, AttributeValue>,
}

impl ActorBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attributes: HashMap::new(),
        }
    }

    /// Sets the value of any attribute for the actor, replacing an earlier value of the same
    /// name.
    pub fn set_value(&mut self, attribute_name: &str, value: AttributeValue) -> &mut Self {
        let _ = self.attributes.insert(attribute_name.to_owned(), value);
        self
    }

    pub fn set_bool(&mut self, attribute_name: &str, value: bool) -> &mut Self {
        self.set_value(attribute_name, AttributeValue::Bool(value))
    }

    pub fn set_string(&mut self, attribute_name: &str, value: impl Into<String>) -> &mut Self {
        self.set_value(attribute_name, AttributeValue::String(value.into()))
    }

    /// Sets a list attribute, such as the actor's roles.
    pub fn set_strings<I, S>(&mut self, attribute_name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.set_value(attribute_name, AttributeValue::Array(values))
    }

    /// Creates an actor from the current builder properties.
    ///
    /// The builder is not consumed, so it can be modified and built again.
    pub fn build(&self) -> Result<Actor> {
        let key = self.key.trim();
        if key.is_empty() {
            return Err(Error::invalid("actor key cannot be empty"));
        }
        Ok(Actor {
            key: key.to_owned(),
            attributes: self.attributes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test]
    fn builds_actor_with_attributes() {
        let actor = Actor::with_key("22")
            .set_bool("admin", true)
            .set_string("plan", "pro")
            .build()
            .unwrap();

        assert_that!(actor.key()).is_equal_to("22");
        assert_that!(actor.flag("admin")).is_true();
        assert_that!(actor.flag("plan")).is_false();
        assert_that!(actor.flag("missing")).is_false();
        assert_that!(actor.attribute("plan").and_then(AttributeValue::as_str))
            .contains_value("pro");
    }

    #[test]
    fn list_attributes_are_searchable() {
        let actor = Actor::with_key("22")
            .set_strings("roles", ["admin", "beta"])
            .build()
            .unwrap();
        let roles = actor.attribute("roles").unwrap();
        assert_that!(roles.contains_str("beta")).is_true();
        assert_that!(roles.contains_str("staff")).is_false();
        assert_that!(actor.flag("roles")).is_false();
    }

    #[test]
    fn trims_the_key() {
        let actor = Actor::with_key("  alice ").build().unwrap();
        assert_that!(actor.key()).is_equal_to("alice");
    }

    #[test_case(""; "empty")]
    #[test_case("   "; "whitespace only")]
    fn rejects_empty_keys(key: &str) {
        assert!(matches!(
            Actor::with_key(key).build(),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn builder_can_be_reused() {
        let mut builder = Actor::with_key("bob");
        let plain = builder.build().unwrap();
        let admin = builder.set_bool("admin", true).build().unwrap();
        assert_that!(plain.flag("admin")).is_false();
        assert_that!(admin.flag("admin")).is_true();
    }

    #[test]
    fn deserializes_from_json() {
        let actor: Actor =
            serde_json::from_str(r#"{"key": "7", "attributes": {"admin": true}}"#).unwrap();
        assert_that!(actor.key()).is_equal_to("7");
        assert_that!(actor.flag("admin")).is_true();

        let bare: Actor = serde_json::from_str(r#"{"key": "8"}"#).unwrap();
        assert_that!(bare.attribute("admin")).is_none();
    }
}
