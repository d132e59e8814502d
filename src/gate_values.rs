use serde::{Deserialize, Serialize};

use crate::gate::{GateKind, GateTarget, MemberSet, Percentage};

/// The stored gate values of one feature, as returned by a single adapter read.
///
/// A default `GateValues` has no gates set, which means the feature is disabled for everyone.
/// Adapters build a fresh value per read; the evaluator only ever borrows it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GateValues {
    #[serde(default)]
    pub boolean: bool,
    #[serde(default)]
    pub actors: MemberSet,
    #[serde(default)]
    pub groups: MemberSet,
    #[serde(default)]
    pub percentage_of_actors: Percentage,
    #[serde(default)]
    pub percentage_of_time: Percentage,
}

impl GateValues {
    /// The canonical empty snapshot returned for unknown or removed features.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        GateKind::ALL.iter().all(|kind| !self.is_set(*kind))
    }

    /// Returns true if the slot for `kind` holds a non-empty value.
    pub fn is_set(&self, kind: GateKind) -> bool {
        match kind {
            GateKind::Boolean => self.boolean,
            GateKind::Actor => !self.actors.is_empty(),
            GateKind::Group => !self.groups.is_empty(),
            GateKind::PercentageOfActors => !self.percentage_of_actors.is_zero(),
            GateKind::PercentageOfTime => !self.percentage_of_time.is_zero(),
        }
    }

    /// Applies an `enable` of `target` to these values. Used by the local adapters.
    pub(crate) fn apply_enable(&mut self, target: &GateTarget) {
        match target {
            GateTarget::Boolean => self.boolean = true,
            GateTarget::Actor(id) => {
                self.actors.insert(id.as_str());
            }
            GateTarget::Group(name) => {
                self.groups.insert(name.as_str());
            }
            GateTarget::PercentageOfActors(percentage) => self.percentage_of_actors = *percentage,
            GateTarget::PercentageOfTime(percentage) => self.percentage_of_time = *percentage,
        }
    }

    /// Applies a `disable` of `target` to these values. Used by the local adapters.
    pub(crate) fn apply_disable(&mut self, target: &GateTarget) {
        match target {
            GateTarget::Boolean => self.boolean = false,
            GateTarget::Actor(id) => {
                self.actors.remove(id);
            }
            GateTarget::Group(name) => {
                self.groups.remove(name);
            }
            GateTarget::PercentageOfActors(_) => self.percentage_of_actors = Percentage::ZERO,
            GateTarget::PercentageOfTime(_) => self.percentage_of_time = Percentage::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    fn percent(value: u32) -> Percentage {
        Percentage::new(value).unwrap()
    }

    #[test]
    fn empty_snapshot_has_no_gates_set() {
        let values = GateValues::empty();
        assert_that!(values.is_empty()).is_true();
        for kind in GateKind::ALL {
            assert_that!(values.is_set(kind)).is_false();
        }
    }

    #[test]
    fn enable_and_disable_touch_exactly_one_pair() {
        let mut values = GateValues::empty();
        values.apply_enable(&GateTarget::Group("admins".into()));
        values.apply_enable(&GateTarget::Group("staff".into()));
        values.apply_enable(&GateTarget::Actor("42".into()));
        values.apply_enable(&GateTarget::PercentageOfActors(percent(25)));

        values.apply_disable(&GateTarget::Group("admins".into()));
        assert_that!(values.groups.iter().collect::<Vec<_>>()).is_equal_to(vec!["staff"]);
        assert_that!(values.actors.contains("42")).is_true();
        assert_that!(values.percentage_of_actors.value()).is_equal_to(25);

        values.apply_disable(&GateTarget::PercentageOfActors(percent(80)));
        assert_that!(values.is_set(GateKind::PercentageOfActors)).is_false();
    }

    #[test]
    fn boolean_gate_is_presence_only() {
        let mut values = GateValues::empty();
        values.apply_enable(&GateTarget::Boolean);
        values.apply_enable(&GateTarget::Boolean);
        assert_that!(values.is_set(GateKind::Boolean)).is_true();
        values.apply_disable(&GateTarget::Boolean);
        assert_that!(values.is_empty()).is_true();
    }
}
