//! JDBC driver and TLS material configuration
//!
//! A [`DriverConfig`] names the JDBC driver class the execution engine loads
//! and the archive it is loaded from. The engine ships with a default driver,
//! so both are optional, but a non-default class is useless without an
//! archive to load it from.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials::SensitiveString;
use crate::error::{Error, Result};
use crate::security::validate_driver_class;

/// Driver class loaded when none is configured
pub const DEFAULT_DRIVER_CLASS: &str = "com.ibm.db2.jcc.DB2Driver";

/// Which JDBC driver class to load and where to load it from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DriverConfig {
    /// Fully qualified driver class name (default: the engine's bundled driver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Path to the driver archive (e.g. a `.jar`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lib: Option<PathBuf>,
}

impl DriverConfig {
    /// Configuration using the default driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the driver class
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Set the driver archive path
    pub fn with_lib(mut self, lib: impl Into<PathBuf>) -> Self {
        self.lib = Some(lib.into());
        self
    }

    /// Driver class in effect
    pub fn effective_class(&self) -> &str {
        self.class.as_deref().unwrap_or(DEFAULT_DRIVER_CLASS)
    }

    /// Whether a class other than the default is requested
    pub fn is_custom(&self) -> bool {
        self.class
            .as_deref()
            .is_some_and(|c| c != DEFAULT_DRIVER_CLASS)
    }

    /// Validate the driver configuration.
    ///
    /// 1. A non-default class requires `lib`.
    /// 2. A given `lib` must name an existing regular file. Only the file's
    ///    metadata is read.
    pub fn validate(&self) -> Result<()> {
        if let Some(class) = &self.class {
            validate_driver_class(class)?;
        }

        if self.is_custom() && self.lib.is_none() {
            return Err(Error::config(format!(
                "JDBC driver class '{}' is not the default ('{}'); a driver library path is required",
                self.effective_class(),
                DEFAULT_DRIVER_CLASS
            )));
        }

        if let Some(lib) = &self.lib {
            require_file(lib, "JDBC driver library")?;
        }

        Ok(())
    }
}

/// Fail with invalid-configuration unless `path` is an existing regular file
pub(crate) fn require_file(path: &Path, what: &str) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(Error::config(format!(
            "{} '{}' is not a regular file",
            what,
            path.display()
        ))),
        Err(e) => Err(Error::config(format!(
            "{} '{}' does not exist or is not accessible: {}",
            what,
            path.display(),
            e
        ))),
    }
}

/// Key or trust store used for TLS connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Path to the store file
    pub path: PathBuf,

    /// Store format (default: `JKS`)
    #[serde(default = "default_store_type", rename = "type")]
    pub store_type: String,

    /// Store password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SensitiveString>,
}

fn default_store_type() -> String {
    "JKS".to_string()
}

impl StoreConfig {
    /// Store at `path` with the default type and no password
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store_type: default_store_type(),
            password: None,
        }
    }

    /// Set the store type
    pub fn with_type(mut self, store_type: impl Into<String>) -> Self {
        self.store_type = store_type.into();
        self
    }

    /// Set the store password
    pub fn with_password(mut self, password: impl Into<SensitiveString>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// TLS settings for the database connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TlsConfig {
    /// Use a TLS connection
    #[serde(default)]
    pub enabled: bool,

    /// Client key store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore: Option<StoreConfig>,

    /// Trust store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truststore: Option<StoreConfig>,
}

impl TlsConfig {
    /// TLS enabled without explicit stores (JVM defaults)
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Set the key store
    pub fn with_keystore(mut self, store: StoreConfig) -> Self {
        self.keystore = Some(store);
        self
    }

    /// Set the trust store
    pub fn with_truststore(mut self, store: StoreConfig) -> Self {
        self.truststore = Some(store);
        self
    }

    /// Stores only make sense on a TLS connection and must exist on disk
    pub fn validate(&self) -> Result<()> {
        if !self.enabled && (self.keystore.is_some() || self.truststore.is_some()) {
            return Err(Error::config(
                "keystore/truststore configured but TLS is not enabled",
            ));
        }
        if let Some(store) = &self.keystore {
            require_file(&store.path, "keystore")?;
        }
        if let Some(store) = &self.truststore {
            require_file(&store.path, "truststore")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn driver_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".jar").tempfile().unwrap();
        file.write_all(b"PK").unwrap();
        file
    }

    #[test]
    fn test_default_driver_is_valid() {
        let config = DriverConfig::new();
        assert!(config.validate().is_ok());
        assert!(!config.is_custom());
        assert_eq!(config.effective_class(), DEFAULT_DRIVER_CLASS);
    }

    #[test]
    fn test_explicit_default_class_needs_no_lib() {
        let config = DriverConfig::new().with_class(DEFAULT_DRIVER_CLASS);
        assert!(!config.is_custom());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_class_without_lib() {
        let err = DriverConfig::new()
            .with_class("com.any.DBDriver")
            .validate()
            .unwrap_err();
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn test_missing_lib_file() {
        let err = DriverConfig::new()
            .with_class("com.any.DBDriver")
            .with_lib("_any_invalid_file_")
            .validate()
            .unwrap_err();
        assert!(err.is_invalid_configuration());
        assert!(err.to_string().contains("_any_invalid_file_"));
    }

    #[test]
    fn test_lib_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DriverConfig::new().with_lib(dir.path()).validate().unwrap_err();
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn test_custom_class_with_existing_lib() {
        let jar = driver_file();
        let config = DriverConfig::new()
            .with_class("com.any.DBDriver")
            .with_lib(jar.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tls_stores_require_tls() {
        let store = driver_file();
        let config = TlsConfig::default().with_truststore(StoreConfig::new(store.path()));
        assert!(config.validate().is_err());

        let config = TlsConfig::enabled().with_truststore(StoreConfig::new(store.path()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tls_missing_keystore() {
        let config = TlsConfig::enabled().with_keystore(
            StoreConfig::new("/nonexistent/keystore.jks")
                .with_type("PKCS12")
                .with_password("changeit"),
        );
        assert!(config.validate().unwrap_err().is_invalid_configuration());
    }
}
