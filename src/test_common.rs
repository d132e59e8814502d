#![cfg(test)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tiny_http::{Request, Response, Server};
use url::Url;

use crate::actor::Actor;
use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::gate::GateKind;
use crate::group::GroupRegistry;
use crate::http::wire::{
    gate_target_from_request, AddFeatureRequest, FeatureListResponse, FeatureMapResponse,
    FeatureResponse,
};
use crate::memory::MemoryAdapter;

pub fn actor(key: &str) -> Actor {
    Actor::with_key(key).build().unwrap()
}

pub fn admin(key: &str, is_admin: bool) -> Actor {
    Actor::with_key(key).set_bool("admin", is_admin).build().unwrap()
}

pub fn registry_with_admins() -> GroupRegistry {
    let mut registry = GroupRegistry::new();
    registry
        .register("admins", |actor: &Actor| actor.flag("admin"))
        .unwrap();
    registry
}

/// Generates the behavior every [Adapter] must share. `$setup` is evaluated once per test and
/// yields `(adapter, guard)`; the guard keeps whatever backs the adapter alive for the test.
///
/// The invoking module must have the [Adapter] trait and `spectral::prelude::*` in scope.
macro_rules! adapter_conformance_tests {
    ($setup:expr) => {
        mod conformance {
            #[allow(unused_imports)]
            use super::*;
            use $crate::gate::{GateTarget, Percentage};
            use $crate::gate_values::GateValues;

            fn percent(value: u32) -> Percentage {
                Percentage::new(value).unwrap()
            }

            fn keys(set: std::collections::BTreeSet<String>) -> Vec<String> {
                set.into_iter().collect()
            }

            #[test]
            fn unknown_feature_reads_as_empty() {
                let (adapter, _guard) = $setup;
                assert_that!(adapter.get("search")).is_ok_containing(GateValues::empty());
                assert_that!(adapter.features().unwrap().is_empty()).is_true();
            }

            #[test]
            fn add_is_idempotent_and_sets_no_gates() {
                let (adapter, _guard) = $setup;
                adapter.add("stats").unwrap();
                adapter.add("stats").unwrap();
                assert_that!(keys(adapter.features().unwrap()))
                    .is_equal_to(vec!["stats".to_string()]);
                assert_that!(adapter.get("stats")).is_ok_containing(GateValues::empty());
            }

            #[test]
            fn remove_deletes_gates_and_registration() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Boolean).unwrap();
                adapter.enable("search", &GateTarget::Actor("22".into())).unwrap();
                adapter.remove("search").unwrap();
                assert_that!(adapter.get("search")).is_ok_containing(GateValues::empty());
                assert_that!(adapter.features().unwrap().contains("search")).is_false();
            }

            #[test]
            fn remove_is_idempotent() {
                let (adapter, _guard) = $setup;
                adapter.remove("search").unwrap();
                adapter.add("search").unwrap();
                adapter.remove("search").unwrap();
                adapter.remove("search").unwrap();
                assert_that!(adapter.features().unwrap().is_empty()).is_true();
            }

            #[test]
            fn clear_resets_gates_but_keeps_the_feature() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Boolean).unwrap();
                adapter.enable("search", &GateTarget::Group("admins".into())).unwrap();
                adapter
                    .enable("search", &GateTarget::PercentageOfTime(percent(45)))
                    .unwrap();
                adapter.clear("search").unwrap();
                assert_that!(adapter.get("search")).is_ok_containing(GateValues::empty());
                assert_that!(adapter.features().unwrap().contains("search")).is_true();
            }

            #[test]
            fn enable_registers_the_feature() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Actor("22".into())).unwrap();
                assert_that!(keys(adapter.features().unwrap()))
                    .is_equal_to(vec!["search".to_string()]);
            }

            #[test]
            fn boolean_gate_toggles() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Boolean).unwrap();
                assert_that!(adapter.get("search").unwrap().boolean).is_true();
                adapter.disable("search", &GateTarget::Boolean).unwrap();
                assert_that!(adapter.get("search").unwrap().boolean).is_false();
            }

            #[test]
            fn actor_disable_leaves_other_actors() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Actor("22".into())).unwrap();
                adapter.enable("search", &GateTarget::Actor("asdf".into())).unwrap();
                adapter.enable("search", &GateTarget::Actor("22".into())).unwrap();
                let values = adapter.get("search").unwrap();
                assert_that!(values.actors.len()).is_equal_to(2);

                adapter.disable("search", &GateTarget::Actor("22".into())).unwrap();
                let values = adapter.get("search").unwrap();
                assert_that!(values.actors.iter().collect::<Vec<_>>()).is_equal_to(vec!["asdf"]);
            }

            #[test]
            fn group_disable_leaves_other_groups() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Group("admins".into())).unwrap();
                adapter.enable("search", &GateTarget::Group("early_access".into())).unwrap();
                adapter.disable("search", &GateTarget::Group("early_access".into())).unwrap();
                let values = adapter.get("search").unwrap();
                assert_that!(values.groups.iter().collect::<Vec<_>>()).is_equal_to(vec!["admins"]);
            }

            #[test]
            fn percentage_gates_overwrite_and_reset() {
                let (adapter, _guard) = $setup;
                adapter
                    .enable("search", &GateTarget::PercentageOfActors(percent(15)))
                    .unwrap();
                adapter
                    .enable("search", &GateTarget::PercentageOfActors(percent(25)))
                    .unwrap();
                adapter
                    .enable("search", &GateTarget::PercentageOfTime(percent(45)))
                    .unwrap();
                let values = adapter.get("search").unwrap();
                assert_that!(values.percentage_of_actors.value()).is_equal_to(25);
                assert_that!(values.percentage_of_time.value()).is_equal_to(45);

                adapter
                    .disable("search", &GateTarget::PercentageOfActors(Percentage::ZERO))
                    .unwrap();
                adapter
                    .disable("search", &GateTarget::PercentageOfTime(Percentage::ZERO))
                    .unwrap();
                let values = adapter.get("search").unwrap();
                assert_that!(values.percentage_of_actors.is_zero()).is_true();
                assert_that!(values.percentage_of_time.is_zero()).is_true();
            }

            #[test]
            fn get_multi_has_one_entry_per_key() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Boolean).unwrap();
                adapter.enable("stats", &GateTarget::Actor("22".into())).unwrap();
                let result = adapter.get_multi(&["search", "stats", "unknown"]).unwrap();
                assert_that!(result.len()).is_equal_to(3);
                assert_that!(result["search"].boolean).is_true();
                assert_that!(result["stats"].actors.contains("22")).is_true();
                assert_that!(result["unknown"].clone()).is_equal_to(GateValues::empty());
            }

            #[test]
            fn get_all_covers_every_registered_feature() {
                let (adapter, _guard) = $setup;
                adapter.add("stats").unwrap();
                adapter
                    .enable("search", &GateTarget::PercentageOfActors(percent(10)))
                    .unwrap();
                let all = adapter.get_all().unwrap();
                assert_that!(all.len()).is_equal_to(2);
                assert_that!(all["stats"].clone()).is_equal_to(GateValues::empty());
                assert_that!(all["search"].percentage_of_actors.value()).is_equal_to(10);
            }

            #[test]
            fn re_adding_after_remove_starts_empty() {
                let (adapter, _guard) = $setup;
                adapter.enable("search", &GateTarget::Boolean).unwrap();
                adapter.remove("search").unwrap();
                adapter.add("search").unwrap();
                assert_that!(adapter.get("search")).is_ok_containing(GateValues::empty());
            }

            #[test]
            fn admins_group_scenario() {
                let (adapter, _guard) = $setup;
                let registry = $crate::test_common::registry_with_admins();
                let admin = $crate::test_common::admin("1", true);
                let regular = $crate::test_common::admin("2", false);
                let check = |actor| {
                    let values = adapter.get("search").unwrap();
                    $crate::eval::enabled("search", &values, &registry, Some(actor)).unwrap()
                };

                assert_that!(check(&admin)).is_false();
                adapter.enable("search", &GateTarget::Group("admins".into())).unwrap();
                assert_that!(check(&admin)).is_true();
                assert_that!(check(&regular)).is_false();
                adapter.disable("search", &GateTarget::Group("admins".into())).unwrap();
                assert_that!(check(&admin)).is_false();
            }
        }
    };
}

pub(crate) use adapter_conformance_tests;

/// A request as the [TestServer] received it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query, as sent on the request line.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

enum Behavior {
    /// Serves the Feature API over an in-memory store.
    Api(MemoryAdapter),
    /// Answers every request with the same status and body.
    Fixed { status: u16, body: String },
    /// Sleeps before answering with an empty feature list.
    Delayed(Duration),
}

/// Local HTTP server on an ephemeral port, shut down when dropped.
pub struct TestServer {
    server: Arc<Server>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn api() -> Self {
        Self::start(Behavior::Api(MemoryAdapter::new()))
    }

    pub fn fixed(status: u16, body: &str) -> Self {
        Self::start(Behavior::Fixed {
            status,
            body: body.to_owned(),
        })
    }

    pub fn delayed(delay: Duration) -> Self {
        Self::start(Behavior::Delayed(delay))
    }

    fn start(behavior: Behavior) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let recorded = record(&mut request);
                    let (status, body) = respond(&behavior, &recorded);
                    requests.lock().push(recorded);

                    let response = Response::from_string(body).with_status_code(status);
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            requests,
            handle: Some(handle),
        }
    }

    /// `http://127.0.0.1:{port}`, without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.server.server_addr())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn record(request: &mut Request) -> RecordedRequest {
    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);
    RecordedRequest {
        method: request.method().to_string(),
        url: request.url().to_owned(),
        headers: request
            .headers()
            .iter()
            .map(|header| (header.field.to_string(), header.value.to_string()))
            .collect(),
        body,
    }
}

fn respond(behavior: &Behavior, request: &RecordedRequest) -> (u16, String) {
    match behavior {
        Behavior::Fixed { status, body } => (*status, body.clone()),
        Behavior::Delayed(delay) => {
            thread::sleep(*delay);
            (200, r#"{"features": []}"#.to_owned())
        }
        Behavior::Api(adapter) => match route(adapter, request) {
            Ok(Some(body)) => (200, body.to_string()),
            Ok(None) => (204, String::new()),
            Err(Error::InvalidValue { message }) => {
                (422, serde_json::json!({ "message": message }).to_string())
            }
            Err(other) => (500, other.to_string()),
        },
    }
}

/// Routes one Feature API request to `adapter`. Everything before the `features` path segment is
/// treated as the mount path.
fn route(adapter: &MemoryAdapter, request: &RecordedRequest) -> Result<Option<Value>> {
    let url = Url::parse(&format!("http://localhost{}", request.url))
        .map_err(|e| Error::invalid(e.to_string()))?;
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let segments = match segments.iter().position(|s| *s == "features") {
        Some(start) => &segments[start + 1..],
        None => return Err(Error::invalid(format!("no route for {}", request.url))),
    };
    let body: Value = if request.body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&request.body).map_err(|e| Error::invalid(e.to_string()))?
    };

    let feature = |key: &str| -> Result<Option<Value>> {
        to_json(&FeatureResponse::new(key, &adapter.get(key)?))
    };

    match (request.method.as_str(), segments) {
        ("GET", []) => match url.query_pairs().find(|(name, _)| name == "keys") {
            Some((_, keys)) => {
                let registered = adapter.features()?;
                let features = keys
                    .split(',')
                    .filter(|key| registered.contains(*key))
                    .map(|key| Ok((key.to_owned(), FeatureResponse::new(key, &adapter.get(key)?))))
                    .collect::<Result<_>>()?;
                to_json(&FeatureMapResponse { features })
            }
            None => {
                let mut all: Vec<_> = adapter.get_all()?.into_iter().collect();
                all.sort_by(|a, b| a.0.cmp(&b.0));
                let features = all
                    .iter()
                    .map(|(key, values)| FeatureResponse::new(key.as_str(), values))
                    .collect();
                to_json(&FeatureListResponse { features })
            }
        },
        ("POST", []) => {
            let request: AddFeatureRequest =
                serde_json::from_value(body).map_err(|e| Error::invalid(e.to_string()))?;
            adapter.add(&request.name)?;
            feature(&request.name)
        }
        ("GET", [key]) => feature(key),
        ("DELETE", [key]) => {
            adapter.remove(key)?;
            Ok(None)
        }
        ("DELETE", [key, "clear"]) => {
            adapter.clear(key)?;
            feature(key)
        }
        (method @ ("POST" | "DELETE"), [key, gate]) => {
            let kind = GateKind::from_key(gate)
                .ok_or_else(|| Error::invalid(format!("unknown gate {}", gate)))?;
            let target = gate_target_from_request(kind, &body)?;
            if method == "POST" {
                adapter.enable(key, &target)?;
            } else {
                adapter.disable(key, &target)?;
            }
            feature(key)
        }
        _ => Err(Error::invalid(format!(
            "no route for {} {}",
            request.method, request.url
        ))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Option<Value>> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| Error::invalid(e.to_string()))
}
