//! JSON bodies exchanged with a remote Feature API.
//!
//! Both directions live here so that a server exposing an [crate::Adapter] over HTTP can build
//! exactly the shapes [crate::HttpAdapter] parses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::gate::{GateKind, GateTarget, MemberSet, Percentage};
use crate::gate_values::GateValues;

/// One entry of a feature's `gates` array.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GateResponse {
    pub key: String,
    /// Required; an explicit `null` means the gate is unset.
    pub value: Value,
}

/// Body of `GET /features/{key}`, and the per-feature shape inside the list responses.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FeatureResponse {
    pub key: String,
    pub gates: Vec<GateResponse>,
}

/// Body of `GET /features?keys=...`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FeatureMapResponse {
    pub features: HashMap<String, FeatureResponse>,
}

/// Body of `GET /features`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FeatureListResponse {
    pub features: Vec<FeatureResponse>,
}

/// Body of `POST /features`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AddFeatureRequest {
    pub name: String,
}

impl FeatureResponse {
    /// Encodes `values`, listing only the gates that are set.
    pub fn new(key: impl Into<String>, values: &GateValues) -> Self {
        let gates = GateKind::ALL
            .into_iter()
            .filter(|kind| values.is_set(*kind))
            .map(|kind| GateResponse {
                key: kind.key().to_owned(),
                value: encode_gate(kind, values),
            })
            .collect();
        FeatureResponse {
            key: key.into(),
            gates,
        }
    }

    /// Decodes the gates array. Unknown gate keys and values of the wrong shape are errors.
    pub fn to_gate_values(&self) -> Result<GateValues> {
        let mut values = GateValues::empty();
        for gate in &self.gates {
            let kind = GateKind::from_key(&gate.key).ok_or_else(|| {
                Error::malformed(format!(
                    "feature {} has unknown gate {}",
                    self.key, gate.key
                ))
            })?;
            let context = |e: Error| match e {
                Error::MalformedResponse { message } => Error::malformed(format!(
                    "feature {} gate {}: {}",
                    self.key, gate.key, message
                )),
                other => other,
            };
            match kind {
                GateKind::Boolean => values.boolean = decode_bool(&gate.value).map_err(context)?,
                GateKind::Actor => values.actors = decode_set(&gate.value).map_err(context)?,
                GateKind::Group => values.groups = decode_set(&gate.value).map_err(context)?,
                GateKind::PercentageOfActors => {
                    values.percentage_of_actors = decode_percentage(&gate.value).map_err(context)?
                }
                GateKind::PercentageOfTime => {
                    values.percentage_of_time = decode_percentage(&gate.value).map_err(context)?
                }
            }
        }
        Ok(values)
    }
}

fn encode_gate(kind: GateKind, values: &GateValues) -> Value {
    match kind {
        GateKind::Boolean => Value::from(values.boolean.to_string()),
        GateKind::Actor => Value::from(values.actors.iter().collect::<Vec<_>>()),
        GateKind::Group => Value::from(values.groups.iter().collect::<Vec<_>>()),
        GateKind::PercentageOfActors => Value::from(values.percentage_of_actors.to_string()),
        GateKind::PercentageOfTime => Value::from(values.percentage_of_time.to_string()),
    }
}

fn decode_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(Error::malformed(format!("expected a boolean, got {:?}", other))),
        },
        other => Err(Error::malformed(format!("expected a boolean, got {}", other))),
    }
}

fn decode_set(value: &Value) -> Result<MemberSet> {
    match value {
        Value::Null => Ok(MemberSet::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_owned).ok_or_else(|| {
                    Error::malformed(format!("expected a string member, got {}", item))
                })
            })
            .collect(),
        other => Err(Error::malformed(format!("expected an array, got {}", other))),
    }
}

/// Accepts a decimal string (`"25"`), a whole number, `""` or `null`.
pub(crate) fn decode_percentage(value: &Value) -> Result<Percentage> {
    let number = match value {
        Value::Null => return Ok(Percentage::ZERO),
        Value::String(s) if s.is_empty() => return Ok(Percentage::ZERO),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::malformed(format!("expected a percentage, got {:?}", s)))?,
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::malformed(format!("expected a percentage, got {}", n)))?,
        other => {
            return Err(Error::malformed(format!(
                "expected a percentage, got {}",
                other
            )))
        }
    };
    Percentage::try_from(number).map_err(|e| Error::malformed(e.to_string()))
}

/// The request body sent with an enable/disable of `target`, if it carries a value.
pub fn gate_request_body(target: &GateTarget) -> Option<Value> {
    match target {
        GateTarget::Boolean => None,
        GateTarget::Actor(id) => Some(serde_json::json!({ "flipper_id": id })),
        GateTarget::Group(name) => Some(serde_json::json!({ "name": name })),
        GateTarget::PercentageOfActors(p) | GateTarget::PercentageOfTime(p) => {
            Some(serde_json::json!({ "percentage": p.to_string() }))
        }
    }
}

/// Server side of [gate_request_body]: rebuilds the target from the gate path segment and body.
///
/// Fails with [Error::InvalidValue] when the body is missing a field or holds an invalid value.
pub fn gate_target_from_request(kind: GateKind, body: &Value) -> Result<GateTarget> {
    let field = |name: &str| -> Result<String> {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid(format!("{} is required", name)))
    };
    let percentage = || -> Result<Percentage> {
        let value = body
            .get("percentage")
            .ok_or_else(|| Error::invalid("percentage is required"))?;
        decode_percentage(value).map_err(|e| match e {
            Error::MalformedResponse { message } => Error::invalid(message),
            other => other,
        })
    };
    Ok(match kind {
        GateKind::Boolean => GateTarget::Boolean,
        GateKind::Actor => GateTarget::Actor(field("flipper_id")?),
        GateKind::Group => GateTarget::Group(field("name")?),
        GateKind::PercentageOfActors => GateTarget::PercentageOfActors(percentage()?),
        GateKind::PercentageOfTime => GateTarget::PercentageOfTime(percentage()?),
    })
}
