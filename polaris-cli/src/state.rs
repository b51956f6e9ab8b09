//! Local state file
//!
//! Holds the recorded state of every applied resource together with the
//! simulated RSC account store, so consecutive runs see the same remote.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use polaris_core::resource::{ResourceId, State, Value};
use polaris_provider::MemoryStore;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_FILE: &str = ".polaris/state.json";

const STATE_VERSION: u32 = 1;

/// Recorded state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_type: String,
    pub name: String,
    pub identifier: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ResourceRecord {
    pub fn from_state(state: &State) -> Option<Self> {
        Some(Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            identifier: state.identifier.clone()?,
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        })
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn to_state(&self) -> Result<State, String> {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
            .collect::<Result<HashMap<_, _>, String>>()
            .map_err(|e| format!("{}: {}", self.id(), e))?;
        Ok(State::existing(self.id(), attributes).with_identifier(&self.identifier))
    }
}

/// Content of the state file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// Simulated RSC accounts and SLA assignments
    #[serde(default)]
    pub remote: MemoryStore,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
            remote: MemoryStore::default(),
        }
    }
}

impl StateFile {
    /// Load the state file, or an empty state when it does not exist
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            log::debug!("no state file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let state: StateFile = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid state file {}: {}", path.display(), e))?;
        if state.version != STATE_VERSION {
            return Err(format!(
                "Unsupported state file version {} (expected {})",
                state.version, STATE_VERSION
            ));
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    pub fn key(id: &ResourceId) -> String {
        id.to_string()
    }

    /// Recorded state of a resource
    pub fn get(&self, id: &ResourceId) -> Result<Option<State>, String> {
        self.resources
            .get(&Self::key(id))
            .map(ResourceRecord::to_state)
            .transpose()
    }

    /// Record or forget a resource depending on whether it still exists
    pub fn record(&mut self, id: &ResourceId, state: &State) {
        match ResourceRecord::from_state(state).filter(|_| state.exists) {
            Some(record) => {
                self.resources.insert(Self::key(id), record);
            }
            None => {
                self.resources.remove(&Self::key(id));
            }
        }
    }

    pub fn forget(&mut self, id: &ResourceId) {
        self.resources.remove(&Self::key(id));
    }
}

/// Resolve the state file path
pub fn state_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE))
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

pub fn json_to_value(json: &serde_json::Value) -> Result<Value, String> {
    match json {
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| format!("unsupported number {}", n)),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Array(items) => {
            Ok(Value::List(items.iter().map(json_to_value).collect::<Result<_, _>>()?))
        }
        serde_json::Value::Object(map) => Ok(Value::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
                .collect::<Result<_, String>>()?,
        )),
        serde_json::Value::Null => Err("null values are not supported".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> State {
        let id = ResourceId::new("aws_account", "prod");
        let attributes = HashMap::from([
            ("native_id".to_string(), Value::from("123456789012")),
            ("delete_snapshots_on_destroy".to_string(), Value::Bool(true)),
            (
                "exocompute".to_string(),
                Value::Map(HashMap::from([(
                    "regions".to_string(),
                    Value::string_list(["us-east-1", "us-west-2"]),
                )])),
            ),
        ]);
        State::existing(id, attributes).with_identifier("d2f0c5b4-1e9a-4f3e-9b61-6c3e0a1b2c3d")
    }

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, StateFile::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".polaris").join("state.json");

        let state = sample_state();
        let mut file = StateFile::default();
        file.record(&state.id, &state);
        file.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.get(&state.id).unwrap(), Some(state));
    }

    #[test]
    fn recording_a_missing_resource_forgets_it() {
        let state = sample_state();
        let mut file = StateFile::default();
        file.record(&state.id, &state);
        file.record(&state.id, &State::not_found(state.id.clone()));
        assert!(file.resources.is_empty());
    }

    #[test]
    fn other_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"version": 99}"#).unwrap();
        let err = StateFile::load(&path).unwrap_err();
        assert!(err.contains("version 99"));
    }

    #[test]
    fn null_is_rejected() {
        assert!(json_to_value(&serde_json::Value::Null).is_err());
        assert!(json_to_value(&serde_json::json!(1.5)).is_err());
    }
}
