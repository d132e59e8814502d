use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::adapter::Adapter;
use crate::error::Result;
use crate::gate::GateTarget;
use crate::gate_values::GateValues;

#[derive(Debug, Default)]
struct State {
    features: BTreeSet<String>,
    gates: HashMap<String, GateValues>,
}

/// In-process [Adapter] backed by a map behind a read/write lock.
///
/// This is the reference backend: every other adapter is expected to behave exactly like it.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: RwLock<State>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<GateValues> {
        let state = self.state.read();
        Ok(state.gates.get(key).cloned().unwrap_or_default())
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, GateValues>> {
        let state = self.state.read();
        Ok(keys
            .iter()
            .map(|key| {
                let values = state.gates.get(*key).cloned().unwrap_or_default();
                (key.to_string(), values)
            })
            .collect())
    }

    fn features(&self) -> Result<BTreeSet<String>> {
        Ok(self.state.read().features.clone())
    }

    fn add(&self, key: &str) -> Result<()> {
        self.state.write().features.insert(key.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();
        state.features.remove(key);
        state.gates.remove(key);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.state.write().gates.remove(key);
        Ok(())
    }

    fn enable(&self, key: &str, target: &GateTarget) -> Result<()> {
        let mut state = self.state.write();
        state.features.insert(key.to_owned());
        state
            .gates
            .entry(key.to_owned())
            .or_default()
            .apply_enable(target);
        Ok(())
    }

    fn disable(&self, key: &str, target: &GateTarget) -> Result<()> {
        let mut state = self.state.write();
        if let Some(values) = state.gates.get_mut(key) {
            values.apply_disable(target);
        }
        Ok(())
    }
}
