//! Provider configuration
//!
//! Built from the attributes of the provider block. Attributes that are not
//! set fall back to environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use polaris_core::resource::Value;
use polaris_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use polaris_core::wait::PollConfig;
use serde::Deserialize;

/// Environment variable holding the service account file path
pub const SERVICE_ACCOUNT_FILE_ENV: &str = "RUBRIK_POLARIS_SERVICEACCOUNT_FILE";

/// Errors in the provider configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid provider block: {0}")]
    Schema(String),

    #[error("Invalid provider attribute '{attribute}': {message}")]
    InvalidAttribute { attribute: String, message: String },

    #[error("Failed to read service account file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service account file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid service account: {0}")]
    ServiceAccount(String),
}

impl ConfigError {
    fn attribute(attribute: &str, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}

/// Schema of the provider block
pub fn provider_schema() -> ResourceSchema {
    ResourceSchema::new("polaris")
        .with_description("RSC provider settings")
        .attribute(
            AttributeSchema::new("credentials", AttributeType::String)
                .with_description("Path to an RSC service account file"),
        )
        .attribute(
            AttributeSchema::new("sla_poll_interval_secs", types::positive_int())
                .with_description("Seconds between two SLA assignment checks"),
        )
        .attribute(
            AttributeSchema::new("sla_poll_timeout_secs", types::positive_int())
                .with_description("Seconds before giving up on an SLA assignment"),
        )
}

/// RSC service account credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccount {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub access_token_uri: String,
}

impl ServiceAccount {
    /// Load and validate a service account file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let account: ServiceAccount =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        account.validate()?;
        Ok(account)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("name", &self.name),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("access_token_uri", &self.access_token_uri),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ServiceAccount(format!("{} is empty", field)));
            }
        }
        if !self.access_token_uri.starts_with("https://") {
            return Err(ConfigError::ServiceAccount(format!(
                "access_token_uri must use https, got '{}'",
                self.access_token_uri
            )));
        }
        Ok(())
    }
}

/// Configuration of a provider instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    /// `None` when no credentials are configured, as in local simulation
    pub service_account: Option<ServiceAccount>,
    pub sla_poll: PollConfig,
}

impl ProviderConfig {
    /// Build from provider block attributes, falling back to the process
    /// environment
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        Self::from_attributes_with_env(attributes, |name| std::env::var(name).ok())
    }

    /// Build from provider block attributes, resolving environment variables
    /// through `env`
    pub fn from_attributes_with_env<F>(
        attributes: &HashMap<String, Value>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        provider_schema().validate(attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConfigError::Schema(messages.join("; "))
        })?;

        let credentials = match attributes.get("credentials").and_then(Value::as_str) {
            Some(path) => Some(PathBuf::from(path)),
            None => env(SERVICE_ACCOUNT_FILE_ENV)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        };

        let service_account = match credentials {
            Some(path) => {
                let account = ServiceAccount::from_file(&path)?;
                log::info!("using service account '{}'", account.name);
                Some(account)
            }
            None => None,
        };

        let defaults = PollConfig::default();
        let interval = seconds(attributes, "sla_poll_interval_secs", defaults.interval);
        let timeout = seconds(attributes, "sla_poll_timeout_secs", defaults.timeout);
        if interval > timeout {
            return Err(ConfigError::attribute(
                "sla_poll_interval_secs",
                "must not exceed sla_poll_timeout_secs",
            ));
        }

        Ok(Self {
            service_account,
            sla_poll: PollConfig { interval, timeout },
        })
    }
}

fn seconds(attributes: &HashMap<String, Value>, key: &str, default: Duration) -> Duration {
    attributes
        .get(key)
        .and_then(Value::as_int)
        .map(|n| Duration::from_secs(n.unsigned_abs()))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"{
        "name": "terraform",
        "client_id": "client|abc",
        "client_secret": "secret",
        "access_token_uri": "https://example.my.rubrik.com/api/client_token"
    }"#;

    fn file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_attributes() {
        let config = ProviderConfig::from_attributes_with_env(&HashMap::new(), no_env).unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.sla_poll.interval, Duration::from_secs(5));
        assert_eq!(config.sla_poll.timeout, Duration::from_secs(300));
    }

    #[test]
    fn credentials_from_attribute() {
        let file = file(VALID);
        let mut attributes = HashMap::new();
        attributes.insert(
            "credentials".to_string(),
            Value::String(file.path().display().to_string()),
        );

        let config = ProviderConfig::from_attributes_with_env(&attributes, no_env).unwrap();
        assert_eq!(config.service_account.unwrap().name, "terraform");
    }

    #[test]
    fn credentials_from_environment() {
        let file = file(VALID);
        let path = file.path().display().to_string();

        let config = ProviderConfig::from_attributes_with_env(&HashMap::new(), |name| {
            (name == SERVICE_ACCOUNT_FILE_ENV).then(|| path.clone())
        })
        .unwrap();
        assert_eq!(config.service_account.unwrap().client_id, "client|abc");
    }

    #[test]
    fn insecure_token_uri_is_rejected() {
        let file = file(&VALID.replace("https://", "http://"));
        let err = ServiceAccount::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ServiceAccount(_)));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let file = file("{ not json");
        let err = ServiceAccount::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = ServiceAccount::from_file(Path::new("/nonexistent/sa.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn unknown_provider_attributes_are_rejected() {
        let attributes = HashMap::from([("region".to_string(), Value::from("eastus"))]);
        let err = ProviderConfig::from_attributes_with_env(&attributes, no_env).unwrap_err();
        assert!(err.to_string().contains("Unknown attribute 'region'"));
    }

    #[test]
    fn poll_settings() {
        let mut attributes = HashMap::new();
        attributes.insert("sla_poll_interval_secs".to_string(), Value::Int(1));
        attributes.insert("sla_poll_timeout_secs".to_string(), Value::Int(30));

        let config = ProviderConfig::from_attributes_with_env(&attributes, no_env).unwrap();
        assert_eq!(config.sla_poll.interval, Duration::from_secs(1));
        assert_eq!(config.sla_poll.timeout, Duration::from_secs(30));

        attributes.insert("sla_poll_timeout_secs".to_string(), Value::Int(0));
        let err = ProviderConfig::from_attributes_with_env(&attributes, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Schema(_)));

        attributes.insert("sla_poll_timeout_secs".to_string(), Value::Int(30));
        attributes.insert("sla_poll_interval_secs".to_string(), Value::Int(60));
        let err = ProviderConfig::from_attributes_with_env(&attributes, no_env).unwrap_err();
        assert!(err.to_string().contains("sla_poll_interval_secs"));
    }
}
