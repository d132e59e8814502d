use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::gate::GateTarget;
use crate::gate_values::GateValues;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Document {
    #[serde(default)]
    features: BTreeMap<String, GateValues>,
}

/// [Adapter] persisting every feature to a single JSON file.
///
/// Each call reads the file, and each mutation rewrites it through a sibling temporary file that
/// is renamed into place. A missing file is an empty store. Calls through one instance are
/// serialized; separate processes sharing the file are not coordinated.
#[derive(Debug)]
pub struct FileAdapter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::Storage {
                message: format!("{} is not a valid feature store: {}", self.path.display(), e),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    fn save(&self, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document).map_err(|e| Error::Storage {
            message: e.to_string(),
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        debug!("rewriting feature store {}", self.path.display());
        fs::write(&tmp, bytes).map_err(|e| storage_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))
    }

    /// Runs `f` against the loaded document and saves the result if `f` reports a change.
    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Document) -> bool,
    {
        let _guard = self.lock.lock();
        let mut document = self.load()?;
        if f(&mut document) {
            self.save(&document)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<Document> {
        let _guard = self.lock.lock();
        self.load()
    }
}

fn storage_error(path: &Path, error: std::io::Error) -> Error {
    Error::Storage {
        message: format!("{}: {}", path.display(), error),
    }
}

impl Adapter for FileAdapter {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> Result<GateValues> {
        Ok(self.read()?.features.remove(key).unwrap_or_default())
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, GateValues>> {
        let document = self.read()?;
        Ok(keys
            .iter()
            .map(|key| {
                let values = document.features.get(*key).cloned().unwrap_or_default();
                (key.to_string(), values)
            })
            .collect())
    }

    fn features(&self) -> Result<BTreeSet<String>> {
        Ok(self.read()?.features.into_keys().collect())
    }

    fn get_all(&self) -> Result<HashMap<String, GateValues>> {
        Ok(self.read()?.features.into_iter().collect())
    }

    fn add(&self, key: &str) -> Result<()> {
        self.update(|document| {
            if document.features.contains_key(key) {
                return false;
            }
            document.features.insert(key.to_owned(), GateValues::empty());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|document| document.features.remove(key).is_some())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.update(|document| match document.features.get_mut(key) {
            Some(values) => {
                *values = GateValues::empty();
                true
            }
            None => false,
        })
    }

    fn enable(&self, key: &str, target: &GateTarget) -> Result<()> {
        self.update(|document| {
            document
                .features
                .entry(key.to_owned())
                .or_default()
                .apply_enable(target);
            true
        })
    }

    fn disable(&self, key: &str, target: &GateTarget) -> Result<()> {
        self.update(|document| match document.features.get_mut(key) {
            Some(values) => {
                values.apply_disable(target);
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Percentage;
    use spectral::prelude::*;

    crate::test_common::adapter_conformance_tests!({
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path().join("features.json"));
        (adapter, dir)
    });

    #[test]
    fn state_survives_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");

        let adapter = FileAdapter::new(&path);
        adapter.add("stats").unwrap();
        adapter
            .enable(
                "search",
                &GateTarget::PercentageOfActors(Percentage::new(25).unwrap()),
            )
            .unwrap();
        drop(adapter);

        let reopened = FileAdapter::new(&path);
        assert_that!(reopened.features().unwrap().into_iter().collect::<Vec<_>>())
            .is_equal_to(vec!["search".to_string(), "stats".to_string()]);
        assert_that!(reopened.get("search").unwrap().percentage_of_actors.value())
            .is_equal_to(25);
    }

    #[test]
    fn missing_file_reads_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path().join("absent.json"));
        assert_that!(adapter.features().unwrap().is_empty()).is_true();
        assert_that!(adapter.get("search").unwrap()).is_equal_to(GateValues::empty());
        assert_that!(adapter.path().exists()).is_false();
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        fs::write(&path, b"{ not json").unwrap();

        let adapter = FileAdapter::new(&path);
        assert!(matches!(adapter.get("search"), Err(Error::Storage { .. })));
        assert!(matches!(adapter.add("search"), Err(Error::Storage { .. })));
    }

    #[test]
    fn writes_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        let adapter = FileAdapter::new(&path);
        adapter
            .enable("search", &GateTarget::Group("admins".into()))
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_json_diff::assert_json_eq!(
            written,
            serde_json::json!({
                "features": {
                    "search": {
                        "boolean": false,
                        "actors": [],
                        "groups": ["admins"],
                        "percentage_of_actors": 0,
                        "percentage_of_time": 0
                    }
                }
            })
        );
    }
}
