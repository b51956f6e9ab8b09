//! Resource definition files
//!
//! A definition file is a JSON document with an optional provider block and
//! a list of resources:
//!
//! ```json
//! {
//!   "provider": { "sla_poll_timeout_secs": 120 },
//!   "resources": [
//!     {
//!       "type": "aws_account",
//!       "name": "prod",
//!       "attributes": {
//!         "native_id": "123456789012",
//!         "cloud_native_protection": { "regions": ["us-east-1"] }
//!       }
//!     }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use polaris_core::resource::{Resource, Value};
use serde::Deserialize;

use crate::state::json_to_value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default)]
    provider: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// Parsed definition file
#[derive(Debug, Clone, PartialEq)]
pub struct Definitions {
    pub provider: HashMap<String, Value>,
    pub resources: Vec<Resource>,
}

impl Definitions {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let raw: RawFile =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

        let provider = raw
            .provider
            .iter()
            .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
            .collect::<Result<HashMap<_, _>, String>>()
            .map_err(|e| format!("provider: {}", e))?;

        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());
        for raw in raw.resources {
            let mut resource = Resource::new(raw.resource_type, raw.name);
            if !seen.insert(resource.id.clone()) {
                return Err(format!("Duplicate resource {}", resource.id));
            }
            for (key, value) in &raw.attributes {
                let value =
                    json_to_value(value).map_err(|e| format!("{}.{}: {}", resource.id, key, e))?;
                resource.attributes.insert(key.clone(), value);
            }
            resources.push(resource);
        }

        Ok(Self {
            provider,
            resources,
        })
    }
}
