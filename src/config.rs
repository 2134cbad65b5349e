use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_user_agent() -> String {
    format!("ontology-sdk/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientSettings {
    pub service: ServiceSettings,
    #[serde(default)]
    pub ontology: OntologySettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceSettings {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OntologySettings {
    /// Generated metadata JSON describing the ontology's object types.
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,
}

impl ClientSettings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_dir(Path::new("config"))
    }

    pub fn from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Built-in defaults
            .set_default("service.url", DEFAULT_URL)?
            .set_default("service.timeout_secs", DEFAULT_TIMEOUT_SECS)?
            .set_default("service.user_agent", default_user_agent())?
            // Shared settings, then local overrides
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // ONTOLOGY_SERVICE__URL and friends
            .add_source(
                Environment::with_prefix("ONTOLOGY")
                    .prefix_separator("_")
                    .separator("__"),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}
