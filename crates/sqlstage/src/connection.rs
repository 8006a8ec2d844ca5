//! Connection traits for sqlstage
//!
//! The seam between the reference [`ConnectionEngine`](crate::engine::ConnectionEngine)
//! and whatever actually talks to the database (a JDBC bridge, a native
//! driver, or the mocks in [`testing`](crate::testing)):
//! - Connection: statement execution
//! - Transaction: grouped commits
//! - ConnectionFactory: opens connections from a [`ConnectionConfig`]

use async_trait::async_trait;
use std::collections::HashMap;

use crate::credentials::{redact_text, Credentials, SensitiveString};
use crate::driver::{DriverConfig, TlsConfig};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Begin a transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement that modifies data
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// Everything needed to open a connection for one stage
#[derive(Clone)]
pub struct ConnectionConfig {
    /// JDBC URL (e.g. `jdbc:db2://host:50000/BLUDB`)
    pub url: String,
    /// User name
    pub username: Option<String>,
    /// Password
    pub password: Option<SensitiveString>,
    /// Driver class and archive
    pub driver: DriverConfig,
    /// TLS settings
    pub tls: TlsConfig,
    /// Additional connection properties
    pub properties: HashMap<String, String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field(
                "url",
                &redact_text(&self.url, self.password.as_ref().map(SensitiveString::expose_secret)),
            )
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("driver", &self.driver)
            .field("tls", &self.tls.enabled)
            .field("properties", &self.properties)
            .finish()
    }
}

impl ConnectionConfig {
    /// Configuration with just a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            driver: DriverConfig::default(),
            tls: TlsConfig::default(),
            properties: HashMap::new(),
        }
    }

    /// Derive the connection configuration from service credentials.
    ///
    /// The URL comes from `jdbcurl` / `jdbc_url` / `url`. Credentials
    /// without one cannot be connected with.
    pub fn from_credentials(
        credentials: &Credentials,
        driver: &DriverConfig,
        tls: &TlsConfig,
    ) -> Result<Self> {
        let url = credentials
            .jdbc_url()
            .ok_or_else(|| Error::credentials("credentials carry no 'jdbcurl' or 'url' field"))?;

        let mut config = Self::new(url);
        config.username = credentials.username().map(str::to_string);
        config.password = credentials.password();
        config.driver = driver.clone();
        config.tls = tls.clone();
        if tls.enabled {
            config.properties.insert("sslConnection".into(), "true".into());
        }
        Ok(config)
    }

    /// Add a connection property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
