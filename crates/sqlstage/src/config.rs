//! YAML stage configuration
//!
//! A statement stage can be described in a YAML file: the input stream's
//! schema, where the service credentials live and the statement request
//! itself (flattened into the top level).
//!
//! ```yaml
//! input_schema: "tuple<rstring A, rstring B>"
//! credentials_env: DB2_CREDENTIALS
//! name: inserts
//! sql: "INSERT INTO RUN_SAMPLE (A, B) VALUES (?, ?)"
//! sql_params: "A, B"
//! driver_lib: ${DRIVER_HOME:-/opt/db2}/db2jcc4.jar
//! ```
//!
//! `${VAR}` and `${VAR:-default}` references are expanded before parsing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use validator::Validate;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::request::{build_request, RequestDescriptor, StatementRequest};
use crate::schema::StreamSchema;
use crate::topology::Topology;

static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// A statement stage described in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, JsonSchema)]
pub struct StageConfig {
    /// Schema of the consumed stream (default: `tuple<rstring string>`)
    #[serde(default = "StreamSchema::string")]
    pub input_schema: StreamSchema,

    /// JSON file holding the service credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    /// Environment variable naming the credentials file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub credentials_env: Option<String>,

    /// The statement request
    #[serde(flatten)]
    #[validate(nested)]
    pub request: StatementRequest,
}

impl StageConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loaded stage configuration");
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("failed to parse stage configuration: {}", e)))?;
        config.validate_config()?;
        Ok(config)
    }

    /// Validate field ranges and the credentials location
    pub fn validate_config(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("stage configuration: {}", e)))?;
        if self.credentials_file.is_some() && self.credentials_env.is_some() {
            return Err(Error::config(
                "'credentials_file' and 'credentials_env' are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Load the credentials this stage refers to.
    ///
    /// `path` overrides whatever the configuration names.
    pub fn load_credentials(&self, path: Option<&Path>) -> Result<Credentials> {
        match (path, &self.credentials_file, &self.credentials_env) {
            (Some(path), _, _) => Credentials::from_file(path),
            (None, Some(path), _) => Credentials::from_file(path),
            (None, None, Some(var)) => Credentials::from_env(var),
            (None, None, None) => Err(Error::config(
                "no credentials: set 'credentials_file' or 'credentials_env'",
            )),
        }
    }

    /// Validate the request against a stream of `input_schema` and return
    /// its descriptor
    pub fn descriptor(&self, credentials: Credentials) -> Result<RequestDescriptor> {
        let mut topology = Topology::new("config");
        let input = topology.source(self.input_schema.clone(), Vec::new())?;
        build_request(&input, credentials, &self.request)
    }
}

/// Expand environment variables in the format ${VAR} or ${VAR:-default}
pub(crate) fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}
