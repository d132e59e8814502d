use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// The five evaluation rule kinds. A feature carries at most one value slot per kind.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Boolean,
    #[serde(rename = "actors")]
    Actor,
    #[serde(rename = "groups")]
    Group,
    PercentageOfActors,
    PercentageOfTime,
}

impl GateKind {
    /// All kinds, in evaluation precedence order.
    pub const ALL: [GateKind; 5] = [
        GateKind::Boolean,
        GateKind::Actor,
        GateKind::Group,
        GateKind::PercentageOfActors,
        GateKind::PercentageOfTime,
    ];

    /// The key used for this kind on the wire and in URL paths.
    pub fn key(&self) -> &'static str {
        match self {
            GateKind::Boolean => "boolean",
            GateKind::Actor => "actors",
            GateKind::Group => "groups",
            GateKind::PercentageOfActors => "percentage_of_actors",
            GateKind::PercentageOfTime => "percentage_of_time",
        }
    }

    pub fn from_key(key: &str) -> Option<GateKind> {
        GateKind::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A whole-number percentage in `0..=100`.
///
/// Values can only be constructed through [Percentage::new] (or `TryFrom`), so anything holding a
/// `Percentage` has already passed range validation.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Percentage(u8);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const FULL: Percentage = Percentage(100);

    pub fn new(value: u32) -> Result<Percentage> {
        if value > 100 {
            return Err(Error::invalid(format!(
                "percentage must be between 0 and 100, got {}",
                value
            )));
        }
        Ok(Percentage(value as u8))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u32> for Percentage {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Percentage::new(value)
    }
}

impl TryFrom<i64> for Percentage {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u32::try_from(value)
            .map_err(|_| {
                Error::invalid(format!(
                    "percentage must be between 0 and 100, got {}",
                    value
                ))
            })
            .and_then(Percentage::new)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Percentage {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Percentage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        Percentage::new(value).map_err(serde::de::Error::custom)
    }
}

/// One (kind, value) pair passed to [crate::Adapter::enable] and [crate::Adapter::disable].
///
/// For the set-valued kinds the payload is the single member to add or remove. For the
/// percentage kinds `enable` stores the percentage and `disable` resets it to zero, whatever
/// value is carried.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GateTarget {
    Boolean,
    Actor(String),
    Group(String),
    PercentageOfActors(Percentage),
    PercentageOfTime(Percentage),
}

impl GateTarget {
    pub fn kind(&self) -> GateKind {
        match self {
            GateTarget::Boolean => GateKind::Boolean,
            GateTarget::Actor(_) => GateKind::Actor,
            GateTarget::Group(_) => GateKind::Group,
            GateTarget::PercentageOfActors(_) => GateKind::PercentageOfActors,
            GateTarget::PercentageOfTime(_) => GateKind::PercentageOfTime,
        }
    }
}

/// An insertion-ordered set of strings, used for the actor and group gates.
///
/// Iteration follows insertion order, which is the order group predicates are consulted in.
/// Equality ignores order.
#[derive(Clone, Debug, Default, Eq)]
pub struct MemberSet {
    members: Vec<String>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `member`, returning false if it was already present.
    pub fn insert(&mut self, member: impl Into<String>) -> bool {
        let member = member.into();
        if self.contains(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Removes `member`, returning false if it was not present.
    pub fn remove(&mut self, member: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member);
        self.members.len() != before
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl PartialEq for MemberSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|m| other.contains(m))
    }
}

impl<S: Into<String>> FromIterator<S> for MemberSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = MemberSet::new();
        for member in iter {
            set.insert(member);
        }
        set
    }
}

impl<'a> IntoIterator for &'a MemberSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

impl Serialize for MemberSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.members.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MemberSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let members = Vec::<String>::deserialize(deserializer)?;
        Ok(members.into_iter().collect())
    }
}
