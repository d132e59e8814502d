use serde::Serialize;

use crate::actor::Actor;
use crate::error::Result;
use crate::eval::{self, Reason};
use crate::gate::{GateKind, MemberSet, Percentage};
use crate::gate_values::GateValues;
use crate::group::GroupRegistry;

/// Overall state of a feature, as shown to operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureState {
    /// Enabled for everyone.
    On,
    /// No gate is set.
    Off,
    /// Enabled for some actors, groups or a share of traffic.
    Conditional,
}

/// A feature key together with one snapshot of its gate values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Feature {
    pub key: String,
    pub gates: GateValues,
}

impl Feature {
    pub fn new(key: impl Into<String>, gates: GateValues) -> Self {
        Self {
            key: key.into(),
            gates,
        }
    }

    /// Evaluates this snapshot for `actor`. See [eval::evaluate].
    pub fn evaluate(&self, registry: &GroupRegistry, actor: Option<&Actor>) -> Result<Reason> {
        eval::evaluate(&self.key, &self.gates, registry, actor)
    }

    pub fn is_enabled(&self, registry: &GroupRegistry, actor: Option<&Actor>) -> Result<bool> {
        eval::enabled(&self.key, &self.gates, registry, actor)
    }

    pub fn state(&self) -> FeatureState {
        if self.gates.boolean
            || self.gates.percentage_of_actors == Percentage::FULL
            || self.gates.percentage_of_time == Percentage::FULL
        {
            FeatureState::On
        } else if self.gates.is_empty() {
            FeatureState::Off
        } else {
            FeatureState::Conditional
        }
    }

    pub fn enabled_gate_kinds(&self) -> Vec<GateKind> {
        GateKind::ALL
            .into_iter()
            .filter(|kind| self.gates.is_set(*kind))
            .collect()
    }

    pub fn disabled_gate_kinds(&self) -> Vec<GateKind> {
        GateKind::ALL
            .into_iter()
            .filter(|kind| !self.gates.is_set(*kind))
            .collect()
    }

    pub fn actors_value(&self) -> &MemberSet {
        &self.gates.actors
    }

    pub fn groups_value(&self) -> &MemberSet {
        &self.gates.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateTarget;
    use spectral::prelude::*;
    use test_case::test_case;

    fn feature(targets: &[GateTarget]) -> Feature {
        let mut gates = GateValues::empty();
        for target in targets {
            gates.apply_enable(target);
        }
        Feature::new("search", gates)
    }

    #[test_case(vec![], FeatureState::Off; "no gates")]
    #[test_case(vec![GateTarget::Boolean], FeatureState::On; "boolean")]
    #[test_case(vec![GateTarget::PercentageOfTime(Percentage::FULL)], FeatureState::On; "all of the time")]
    #[test_case(vec![GateTarget::PercentageOfActors(Percentage::FULL)], FeatureState::On; "all actors")]
    #[test_case(vec![GateTarget::Actor("1".into())], FeatureState::Conditional; "one actor")]
    #[test_case(vec![GateTarget::Group("admins".into())], FeatureState::Conditional; "one group")]
    fn reports_state(targets: Vec<GateTarget>, expected: FeatureState) {
        assert_that!(feature(&targets).state()).is_equal_to(expected);
    }

    #[test]
    fn splits_gate_kinds_into_enabled_and_disabled() {
        let feature = feature(&[
            GateTarget::Actor("1".into()),
            GateTarget::PercentageOfTime(Percentage::new(5).unwrap()),
        ]);
        assert_that!(feature.enabled_gate_kinds())
            .is_equal_to(vec![GateKind::Actor, GateKind::PercentageOfTime]);
        assert_that!(feature.disabled_gate_kinds()).is_equal_to(vec![
            GateKind::Boolean,
            GateKind::Group,
            GateKind::PercentageOfActors,
        ]);
    }

    #[test]
    fn exposes_set_values() {
        let feature = feature(&[
            GateTarget::Group("admins".into()),
            GateTarget::Actor("7".into()),
        ]);
        assert_that!(feature.groups_value().contains("admins")).is_true();
        assert_that!(feature.actors_value().contains("7")).is_true();
    }
}
