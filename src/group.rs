use std::fmt;
use std::sync::Arc;

use crate::actor::Actor;
use crate::error::{Error, Result};

/// A named test over actors, consulted by group gates.
///
/// Any `Fn(&Actor) -> bool + Send + Sync` closure is a predicate, so most hosts register groups
/// with a closure such as `|actor| actor.flag("admin")`.
pub trait GroupPredicate: Send + Sync {
    fn evaluate(&self, actor: &Actor) -> bool;
}

impl<F> GroupPredicate for F
where
    F: Fn(&Actor) -> bool + Send + Sync,
{
    fn evaluate(&self, actor: &Actor) -> bool {
        self(actor)
    }
}

/// Table of named group predicates, populated by the host application at startup.
///
/// Names are kept in registration order. Cloning a registry shares the predicates.
#[derive(Clone, Default)]
pub struct GroupRegistry {
    groups: Vec<(String, Arc<dyn GroupPredicate>)>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `predicate` under `name`. The name is trimmed first.
    ///
    /// Fails with [Error::InvalidValue] for an empty name and [Error::DuplicateGroup] if the
    /// name is taken.
    pub fn register<P>(&mut self, name: &str, predicate: P) -> Result<()>
    where
        P: GroupPredicate + 'static,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("group name cannot be empty"));
        }
        if self.contains(name) {
            return Err(Error::DuplicateGroup {
                name: name.to_owned(),
            });
        }
        self.groups.push((name.to_owned(), Arc::new(predicate)));
        Ok(())
    }

    /// Removes the group named `name`, returning false if there was none.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|(n, _)| n != name);
        self.groups.len() != before
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    pub fn get(&self, name: &str) -> Option<&dyn GroupPredicate> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, predicate)| predicate.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
