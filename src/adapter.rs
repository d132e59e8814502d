use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::gate::GateTarget;
use crate::gate_values::GateValues;

/// Adapter is the storage contract every backend implements: in-memory, local file, or a remote
/// Feature API over HTTP.
///
/// The evaluator and [crate::Gatekeeper] only ever talk to this trait, so backends are
/// interchangeable and all of them are held to the same behavior:
///
/// - reading a key that was never added, or was removed, yields [GateValues::empty], never an
///   error;
/// - `add` and `remove` are idempotent;
/// - `enable` and `disable` touch exactly one (kind, value) pair, and `enable` also registers
///   the key in [Adapter::features].
///
/// Keys passed to an adapter are assumed to be validated already (trimmed, non-empty).
/// Adapters never turn a failure into a default answer: errors are returned to the caller.
pub trait Adapter: Send + Sync {
    /// A short name for the backend, used in log output.
    fn name(&self) -> &str;

    /// Returns the current gate values of `key`.
    fn get(&self, key: &str) -> Result<GateValues>;

    /// Batch form of [Adapter::get]. The result has one entry per distinct input key.
    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, GateValues>>;

    /// Every key that has been added or enabled and not removed since.
    fn features(&self) -> Result<BTreeSet<String>>;

    /// Gate values of every registered feature.
    fn get_all(&self) -> Result<HashMap<String, GateValues>> {
        let features = self.features()?;
        let keys: Vec<&str> = features.iter().map(String::as_str).collect();
        self.get_multi(&keys)
    }

    /// Registers `key` without touching its gate values.
    fn add(&self, key: &str) -> Result<()>;

    /// Deletes `key` and all of its gate values.
    fn remove(&self, key: &str) -> Result<()>;

    /// Resets every gate of `key` to empty, leaving it registered.
    fn clear(&self, key: &str) -> Result<()>;

    fn enable(&self, key: &str, target: &GateTarget) -> Result<()>;

    fn disable(&self, key: &str, target: &GateTarget) -> Result<()>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, key: &str) -> Result<GateValues> {
        (**self).get(key)
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, GateValues>> {
        (**self).get_multi(keys)
    }

    fn features(&self) -> Result<BTreeSet<String>> {
        (**self).features()
    }

    fn get_all(&self) -> Result<HashMap<String, GateValues>> {
        (**self).get_all()
    }

    fn add(&self, key: &str) -> Result<()> {
        (**self).add(key)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key)
    }

    fn enable(&self, key: &str, target: &GateTarget) -> Result<()> {
        (**self).enable(key, target)
    }

    fn disable(&self, key: &str, target: &GateTarget) -> Result<()> {
        (**self).disable(key, target)
    }
}
