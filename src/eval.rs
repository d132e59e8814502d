use log::warn;
use rand::Rng;
use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::actor::Actor;
use crate::error::{Error, Result};
use crate::gate_values::GateValues;
use crate::group::GroupRegistry;

const BUCKET_COUNT: u64 = 100;

/// Reason describes which gate, if any, opened a feature for an evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum Reason {
    /// The boolean gate is set; the feature is on for everyone.
    Boolean,
    /// The actor's key is in the actor gate.
    Actor,
    /// The named group's predicate accepted the actor.
    Group { name: String },
    /// The actor's bucket fell below the percentage-of-actors threshold.
    PercentageOfActors,
    /// The percentage-of-time roll succeeded.
    PercentageOfTime,
    /// No gate matched; the feature is disabled.
    NoMatch,
}

impl Reason {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Reason::NoMatch)
    }
}

/// Evaluate a feature's gate values for an optional [Actor].
///
/// Gates are tried in a fixed order and the first match wins: boolean, actor, group,
/// percentage of actors, percentage of time. Without an actor only the boolean and
/// percentage-of-time gates can match.
///
/// Group names are tried in the order they were added to the gate. A name that is not in
/// `registry` fails the whole evaluation with [Error::UnregisteredGroup] unless an earlier group
/// already matched.
///
/// Nothing is cached between calls. Callers that need a stable answer across a request should
/// read the [GateValues] once and pass the same snapshot to every call.
pub fn evaluate(
    feature_key: &str,
    gates: &GateValues,
    registry: &GroupRegistry,
    actor: Option<&Actor>,
) -> Result<Reason> {
    evaluate_with_rng(feature_key, gates, registry, actor, &mut rand::thread_rng())
}

/// Like [evaluate], drawing the percentage-of-time roll from `rng`.
pub fn evaluate_with_rng<R: Rng + ?Sized>(
    feature_key: &str,
    gates: &GateValues,
    registry: &GroupRegistry,
    actor: Option<&Actor>,
    rng: &mut R,
) -> Result<Reason> {
    if gates.boolean {
        return Ok(Reason::Boolean);
    }

    if let Some(actor) = actor {
        if gates.actors.contains(actor.key()) {
            return Ok(Reason::Actor);
        }

        for name in gates.groups.iter() {
            let predicate = registry.get(name).ok_or_else(|| {
                warn!(
                    "feature {} has a gate for group {} which is not registered",
                    feature_key, name
                );
                Error::UnregisteredGroup {
                    name: name.to_owned(),
                }
            })?;
            if predicate.evaluate(actor) {
                return Ok(Reason::Group {
                    name: name.to_owned(),
                });
            }
        }

        let percentage = gates.percentage_of_actors.value();
        if percentage > 0 && bucket(feature_key, actor.key()) < percentage {
            return Ok(Reason::PercentageOfActors);
        }
    }

    let percentage = gates.percentage_of_time.value();
    if percentage > 0 && rng.gen_range(0..100) < percentage {
        return Ok(Reason::PercentageOfTime);
    }

    Ok(Reason::NoMatch)
}

/// Shorthand for `evaluate(..).map(|reason| reason.is_enabled())`.
pub fn enabled(
    feature_key: &str,
    gates: &GateValues,
    registry: &GroupRegistry,
    actor: Option<&Actor>,
) -> Result<bool> {
    evaluate(feature_key, gates, registry, actor).map(|reason| reason.is_enabled())
}

/// The percentage bucket, `0..100`, of an actor for a feature.
///
/// The bucket is derived from a SHA-1 digest of `"{feature_key}.{actor_key}"`, so it is the same
/// in every process and across restarts. Including the feature key keeps an actor's buckets for
/// different features independent.
pub fn bucket(feature_key: &str, actor_key: &str) -> u8 {
    let mut hash = Sha1::new();
    hash.update(feature_key.as_bytes());
    hash.update(b".");
    hash.update(actor_key.as_bytes());
    let digest = hash.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % BUCKET_COUNT) as u8
}
