use std::collections::BTreeSet;

use log::debug;

use crate::actor::Actor;
use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::eval::Reason;
use crate::feature::Feature;
use crate::gate::{GateTarget, Percentage};
use crate::group::{GroupPredicate, GroupRegistry};

/// Trims a user-supplied feature key, rejecting one that is empty afterwards.
pub fn validate_key(name: &str) -> Result<&str> {
    let key = name.trim();
    if key.is_empty() {
        return Err(Error::invalid(format!(
            "\"{}\" is not a valid feature name.",
            key
        )));
    }
    Ok(key)
}

/// Entry point for host applications: checks features against an [Adapter] and changes them.
///
/// Everything passing through a `Gatekeeper` is validated before the adapter sees it. Feature
/// keys, actor ids and group names are trimmed, empty keys and ids are rejected, and enabling a
/// group requires it to be registered. Enabling any gate registers the feature through
/// [Adapter::enable], so it is listed by [Gatekeeper::features].
///
/// Each check performs one adapter read. To evaluate the same feature several times against one
/// consistent snapshot, call [Gatekeeper::feature] once and use [Feature::is_enabled].
pub struct Gatekeeper<A: Adapter> {
    adapter: A,
    groups: GroupRegistry,
}

impl<A: Adapter> Gatekeeper<A> {
    pub fn new(adapter: A) -> Self {
        Self::with_groups(adapter, GroupRegistry::new())
    }

    pub fn with_groups(adapter: A, groups: GroupRegistry) -> Self {
        Self { adapter, groups }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn register_group<P>(&mut self, name: &str, predicate: P) -> Result<()>
    where
        P: GroupPredicate + 'static,
    {
        self.groups.register(name, predicate)
    }

    pub fn unregister_group(&mut self, name: &str) -> bool {
        self.groups.unregister(name)
    }

    /// Reads the current snapshot of one feature.
    pub fn feature(&self, name: &str) -> Result<Feature> {
        let key = validate_key(name)?;
        Ok(Feature::new(key, self.adapter.get(key)?))
    }

    /// Reads several features in one adapter call, returned in the order requested.
    pub fn preload(&self, names: &[&str]) -> Result<Vec<Feature>> {
        let keys = names
            .iter()
            .map(|name| validate_key(name))
            .collect::<Result<Vec<_>>>()?;
        let mut values = self.adapter.get_multi(&keys)?;
        Ok(keys
            .iter()
            .map(|key| Feature::new(*key, values.remove(*key).unwrap_or_default()))
            .collect())
    }

    /// Reads every registered feature, sorted by key.
    pub fn preload_all(&self) -> Result<Vec<Feature>> {
        let mut features: Vec<Feature> = self
            .adapter
            .get_all()?
            .into_iter()
            .map(|(key, gates)| Feature::new(key, gates))
            .collect();
        features.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(features)
    }

    pub fn features(&self) -> Result<BTreeSet<String>> {
        self.adapter.features()
    }

    /// Reads `name` and reports which gate, if any, lets `actor` through.
    pub fn evaluate(&self, name: &str, actor: Option<&Actor>) -> Result<Reason> {
        self.feature(name)?.evaluate(&self.groups, actor)
    }

    pub fn is_enabled(&self, name: &str, actor: Option<&Actor>) -> Result<bool> {
        self.evaluate(name, actor).map(|reason| reason.is_enabled())
    }

    pub fn add(&self, name: &str) -> Result<()> {
        let key = validate_key(name)?;
        debug!("adding feature {} via {}", key, self.adapter.name());
        self.adapter.add(key)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let key = validate_key(name)?;
        debug!("removing feature {} via {}", key, self.adapter.name());
        self.adapter.remove(key)
    }

    pub fn clear(&self, name: &str) -> Result<()> {
        let key = validate_key(name)?;
        self.adapter.clear(key)
    }

    /// Enables one gate of `name`.
    pub fn enable_gate(&self, name: &str, target: GateTarget) -> Result<()> {
        let key = validate_key(name)?;
        let target = self.normalize(target)?;
        if let GateTarget::Group(group) = &target {
            if !self.groups.contains(group) {
                return Err(Error::UnregisteredGroup {
                    name: group.clone(),
                });
            }
        }
        debug!(
            "enabling {} gate of {} via {}",
            target.kind(),
            key,
            self.adapter.name()
        );
        self.adapter.enable(key, &target)
    }

    /// Disables one gate of `name`. Unlike enabling, a group need not be registered to be
    /// removed from the gate.
    pub fn disable_gate(&self, name: &str, target: GateTarget) -> Result<()> {
        let key = validate_key(name)?;
        let target = self.normalize(target)?;
        debug!(
            "disabling {} gate of {} via {}",
            target.kind(),
            key,
            self.adapter.name()
        );
        self.adapter.disable(key, &target)
    }

    /// Turns `name` on for everyone.
    pub fn enable(&self, name: &str) -> Result<()> {
        self.enable_gate(name, GateTarget::Boolean)
    }

    /// Unsets the boolean gate of `name`. Other gates are left alone.
    pub fn disable(&self, name: &str) -> Result<()> {
        self.disable_gate(name, GateTarget::Boolean)
    }

    pub fn enable_actor(&self, name: &str, actor_key: &str) -> Result<()> {
        self.enable_gate(name, GateTarget::Actor(actor_key.to_owned()))
    }

    pub fn disable_actor(&self, name: &str, actor_key: &str) -> Result<()> {
        self.disable_gate(name, GateTarget::Actor(actor_key.to_owned()))
    }

    pub fn enable_group(&self, name: &str, group: &str) -> Result<()> {
        self.enable_gate(name, GateTarget::Group(group.to_owned()))
    }

    pub fn disable_group(&self, name: &str, group: &str) -> Result<()> {
        self.disable_gate(name, GateTarget::Group(group.to_owned()))
    }

    pub fn enable_percentage_of_actors(&self, name: &str, percentage: u32) -> Result<()> {
        let percentage = Percentage::new(percentage)?;
        self.enable_gate(name, GateTarget::PercentageOfActors(percentage))
    }

    pub fn disable_percentage_of_actors(&self, name: &str) -> Result<()> {
        self.disable_gate(name, GateTarget::PercentageOfActors(Percentage::ZERO))
    }

    pub fn enable_percentage_of_time(&self, name: &str, percentage: u32) -> Result<()> {
        let percentage = Percentage::new(percentage)?;
        self.enable_gate(name, GateTarget::PercentageOfTime(percentage))
    }

    pub fn disable_percentage_of_time(&self, name: &str) -> Result<()> {
        self.disable_gate(name, GateTarget::PercentageOfTime(Percentage::ZERO))
    }

    fn normalize(&self, target: GateTarget) -> Result<GateTarget> {
        Ok(match target {
            GateTarget::Actor(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(Error::invalid("actor key cannot be empty"));
                }
                GateTarget::Actor(id.to_owned())
            }
            // An empty name can never be registered, so it reads as an unregistered group.
            GateTarget::Group(name) => GateTarget::Group(name.trim().to_owned()),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateKind;
    use crate::http::{HttpAdapter, HttpAdapterConfig};
    use crate::memory::MemoryAdapter;
    use crate::test_common::{actor, admin, registry_with_admins, TestServer};
    use spectral::prelude::*;
    use test_case::test_case;

    fn gatekeeper() -> Gatekeeper<MemoryAdapter> {
        Gatekeeper::with_groups(MemoryAdapter::new(), registry_with_admins())
    }

    #[test]
    fn search_scenario_with_admins_group() {
        let gates = gatekeeper();
        let admin_actor = admin("1", true);
        let regular = admin("2", false);

        assert_that!(gates.is_enabled("search", Some(&admin_actor))).is_ok_containing(false);

        gates.enable_group("search", "admins").unwrap();
        assert_that!(gates.is_enabled("search", Some(&admin_actor))).is_ok_containing(true);
        assert_that!(gates.is_enabled("search", Some(&regular))).is_ok_containing(false);

        gates.disable_group("search", "admins").unwrap();
        assert_that!(gates.is_enabled("search", Some(&admin_actor))).is_ok_containing(false);
    }

    #[test]
    fn feature_names_are_trimmed() {
        let gates = gatekeeper();
        gates.add("  notifications_next   ").unwrap();
        assert_that!(gates.features().unwrap().into_iter().collect::<Vec<_>>())
            .is_equal_to(vec!["notifications_next".to_string()]);
    }

    #[test_case(""; "empty")]
    #[test_case("   "; "whitespace")]
    fn empty_feature_names_never_reach_the_adapter(name: &str) {
        let gates = gatekeeper();
        let error = gates.add(name).unwrap_err();
        assert_that!(error.to_string())
            .is_equal_to("invalid value: \"\" is not a valid feature name.".to_string());
        assert!(matches!(gates.enable(name), Err(Error::InvalidValue { .. })));
        assert!(matches!(gates.feature(name), Err(Error::InvalidValue { .. })));
        assert_that!(gates.features().unwrap().is_empty()).is_true();
    }

    #[test_case("  admins  "; "surrounding whitespace")]
    #[test_case("admins"; "plain")]
    fn group_names_are_trimmed_on_enable_and_disable(group: &str) {
        let gates = gatekeeper();
        gates.enable_group("search", group).unwrap();
        let feature = gates.feature("search").unwrap();
        assert_that!(feature.groups_value().iter().collect::<Vec<_>>())
            .is_equal_to(vec!["admins"]);

        gates.disable_group("search", group).unwrap();
        assert_that!(gates.feature("search").unwrap().groups_value().is_empty()).is_true();
    }

    #[test_case("not_here")]
    #[test_case("")]
    fn enabling_an_unregistered_group_fails(group: &str) {
        let gates = gatekeeper();
        let error = gates.enable_group("search", group).unwrap_err();
        assert_that!(error.to_string()).is_equal_to(format!(
            "The group named \"{}\" has not been registered.",
            group
        ));
        assert_that!(gates.feature("search").unwrap().gates.is_empty()).is_true();
        assert_that!(gates.features().unwrap().is_empty()).is_true();
    }

    #[test]
    fn percentages_are_validated_before_the_adapter() {
        let gates = gatekeeper();
        assert!(matches!(
            gates.enable_percentage_of_actors("search", 101),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            gates.enable_percentage_of_time("search", 500),
            Err(Error::InvalidValue { .. })
        ));
        assert_that!(gates.features().unwrap().is_empty()).is_true();

        gates.enable_percentage_of_actors("search", 100).unwrap();
        assert_that!(gates.is_enabled("search", Some(&actor("anyone")))).is_ok_containing(true);
        gates.disable_percentage_of_actors("search").unwrap();
        assert_that!(gates.is_enabled("search", Some(&actor("anyone")))).is_ok_containing(false);
    }

    #[test]
    fn actor_keys_are_trimmed_and_must_not_be_empty() {
        let gates = gatekeeper();
        gates.enable_actor("search", " 22 ").unwrap();
        assert_that!(gates.evaluate("search", Some(&actor("22"))))
            .is_ok_containing(Reason::Actor);
        assert!(matches!(
            gates.enable_actor("search", "  "),
            Err(Error::InvalidValue { .. })
        ));
        gates.disable_actor("search", "22").unwrap();
        assert_that!(gates.is_enabled("search", Some(&actor("22")))).is_ok_containing(false);
    }

    #[test]
    fn enabling_registers_the_feature() {
        let gates = gatekeeper();
        gates.enable("stats").unwrap();
        gates.enable_percentage_of_time("search", 10).unwrap();
        assert_that!(gates.features().unwrap().into_iter().collect::<Vec<_>>())
            .is_equal_to(vec!["search".to_string(), "stats".to_string()]);
    }

    #[test]
    fn each_mutation_is_a_single_remote_call() {
        let server = TestServer::api();
        let config = HttpAdapterConfig::from_uri(&server.url()).unwrap();
        let adapter = HttpAdapter::new(config).unwrap();
        let gates = Gatekeeper::with_groups(adapter, registry_with_admins());

        gates.enable_group("search", "admins").unwrap();
        gates.enable_percentage_of_time("search", 5).unwrap();

        let lines: Vec<(String, String)> = server
            .requests()
            .into_iter()
            .map(|request| (request.method, request.url))
            .collect();
        assert_that!(lines).is_equal_to(vec![
            ("POST".to_string(), "/features/search/groups".to_string()),
            ("POST".to_string(), "/features/search/percentage_of_time".to_string()),
        ]);
        assert_that!(gates.features().unwrap().contains("search")).is_true();
    }

    #[test]
    fn boolean_enable_and_disable() {
        let gates = gatekeeper();
        gates.enable_actor("search", "1").unwrap();
        gates.enable("search").unwrap();
        assert_that!(gates.is_enabled("search", None)).is_ok_containing(true);

        gates.disable("search").unwrap();
        assert_that!(gates.is_enabled("search", None)).is_ok_containing(false);
        assert_that!(gates.feature("search").unwrap().enabled_gate_kinds())
            .is_equal_to(vec![GateKind::Actor]);
    }

    #[test]
    fn preload_returns_features_in_request_order() {
        let gates = gatekeeper();
        gates.enable("b").unwrap();
        let features = gates.preload(&["b", " a "]).unwrap();
        assert_that!(features.iter().map(|f| f.key.as_str()).collect::<Vec<_>>())
            .is_equal_to(vec!["b", "a"]);
        assert_that!(features[0].gates.boolean).is_true();
        assert_that!(features[1].gates.is_empty()).is_true();
    }

    #[test]
    fn preload_all_is_sorted_by_key() {
        let gates = gatekeeper();
        gates.enable("stats").unwrap();
        gates.add("alpha").unwrap();
        gates.enable_actor("search", "1").unwrap();
        let keys: Vec<String> = gates
            .preload_all()
            .unwrap()
            .into_iter()
            .map(|feature| feature.key)
            .collect();
        assert_that!(keys).is_equal_to(vec![
            "alpha".to_string(),
            "search".to_string(),
            "stats".to_string(),
        ]);
    }

    #[test]
    fn unregistering_a_group_makes_evaluation_fail() {
        let mut gates = gatekeeper();
        gates.enable_group("search", "admins").unwrap();
        assert_that!(gates.unregister_group("admins")).is_true();

        let result = gates.is_enabled("search", Some(&admin("1", true)));
        assert_that!(result).is_equal_to(Err(Error::UnregisteredGroup {
            name: "admins".into(),
        }));
    }

    #[test]
    fn works_with_a_boxed_adapter() {
        let adapter: Box<dyn Adapter> = Box::new(MemoryAdapter::new());
        let mut gates = Gatekeeper::new(adapter);
        gates
            .register_group("staff", |actor: &Actor| actor.flag("staff"))
            .unwrap();
        gates.enable_group("search", "staff").unwrap();
        let staff = Actor::with_key("5").set_bool("staff", true).build().unwrap();
        assert_that!(gates.is_enabled("search", Some(&staff))).is_ok_containing(true);
        assert_that!(gates.adapter().name()).is_equal_to("memory");
    }

    #[test]
    fn clear_and_remove() {
        let gates = gatekeeper();
        gates.enable("search").unwrap();
        gates.clear("search").unwrap();
        assert_that!(gates.features().unwrap().contains("search")).is_true();
        assert_that!(gates.feature("search").unwrap().gates.is_empty()).is_true();

        gates.enable("search").unwrap();
        gates.remove("search").unwrap();
        assert_that!(gates.features().unwrap().is_empty()).is_true();
        assert_that!(gates.is_enabled("search", None)).is_ok_containing(false);
    }
}
