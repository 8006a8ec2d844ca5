//! Statement requests
//!
//! A [`StatementRequest`] is the caller's description of a SQL-execution
//! stage: driver, output schema and where the SQL comes from.
//! [`build_request`] validates it against the input stream and produces a
//! [`RequestDescriptor`], the only thing an
//! [`ExecutionEngine`](crate::engine::ExecutionEngine) ever receives.
//!
//! # Example
//!
//! ```
//! use sqlstage::prelude::*;
//!
//! let mut topo = Topology::new("example");
//! let input = topo.source_strings(["CREATE TABLE T (A CHAR(10))"]);
//! let creds = Credentials::from_json(r#"{"jdbcurl": "jdbc:db2://h:50000/BLUDB"}"#).unwrap();
//!
//! let request = StatementRequestBuilder::new().build();
//! let descriptor = build_request(&input, creds, &request).unwrap();
//! assert_eq!(descriptor.statement, StatementSource::Attribute("string".into()));
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};
use validator::Validate;

use crate::credentials::Credentials;
use crate::driver::{DriverConfig, TlsConfig};
use crate::error::{Error, Result};
use crate::schema::StreamSchema;
use crate::statement::{count_placeholders, SqlParams, StatementSource};
use crate::topology::StreamRef;

/// Caller-supplied description of a SQL statement stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, JsonSchema)]
pub struct StatementRequest {
    /// Stage name (default: assigned by the topology)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    /// JDBC driver class (default: the engine's bundled driver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_class: Option<String>,

    /// Path to the JDBC driver archive; required for a non-default class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_lib: Option<PathBuf>,

    /// Output schema of result tuples (default: the input stream's schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<StreamSchema>,

    /// Statement run for every input tuple
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    /// Input attribute carrying per-tuple SQL text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_attribute: Option<String>,

    /// Input attributes bound to `?` markers, as a list or `"A, B"`
    #[serde(default)]
    pub sql_params: SqlParams,

    /// Statements per commit (default: 1, autocommit)
    #[serde(default = "default_transaction_size")]
    #[validate(range(min = 1, max = 1000000))]
    pub transaction_size: u32,

    /// TLS settings
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_transaction_size() -> u32 {
    1
}

impl Default for StatementRequest {
    fn default() -> Self {
        Self {
            name: None,
            driver_class: None,
            driver_lib: None,
            schema: None,
            sql: None,
            sql_attribute: None,
            sql_params: SqlParams::default(),
            transaction_size: default_transaction_size(),
            tls: TlsConfig::default(),
        }
    }
}

impl StatementRequest {
    /// Driver configuration described by this request
    pub fn driver(&self) -> DriverConfig {
        DriverConfig {
            class: self.driver_class.clone(),
            lib: self.driver_lib.clone(),
        }
    }
}

/// Builder for [`StatementRequest`]
#[derive(Debug, Default)]
pub struct StatementRequestBuilder {
    request: StatementRequest,
}

impl StatementRequestBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stage name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.request.name = Some(name.into());
        self
    }

    /// Set the JDBC driver class
    pub fn driver_class(mut self, class: impl Into<String>) -> Self {
        self.request.driver_class = Some(class.into());
        self
    }

    /// Set the JDBC driver archive
    pub fn driver_lib(mut self, lib: impl Into<PathBuf>) -> Self {
        self.request.driver_lib = Some(lib.into());
        self
    }

    /// Set the output schema
    pub fn schema(mut self, schema: StreamSchema) -> Self {
        self.request.schema = Some(schema);
        self
    }

    /// Run the same statement for every tuple
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.request.sql = Some(sql.into());
        self
    }

    /// Read per-tuple SQL from an input attribute
    pub fn sql_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.request.sql_attribute = Some(attribute.into());
        self
    }

    /// Bind `?` markers from these input attributes
    pub fn sql_params(mut self, params: SqlParams) -> Self {
        self.request.sql_params = params;
        self
    }

    /// Set statements per commit
    pub fn transaction_size(mut self, size: u32) -> Self {
        self.request.transaction_size = size;
        self
    }

    /// Set TLS settings
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.request.tls = tls;
        self
    }

    /// Build the request
    pub fn build(self) -> StatementRequest {
        self.request
    }
}

/// Validated, ready-to-submit description of a statement stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    /// Stage name, if the caller chose one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stream the stage consumes
    pub input: StreamRef,
    /// Shape of result tuples
    pub output_schema: StreamSchema,
    /// Service credentials, passed through untouched
    pub credentials: Credentials,
    /// Driver class and archive
    pub driver: DriverConfig,
    /// TLS settings
    pub tls: TlsConfig,
    /// Where each statement's text comes from
    pub statement: StatementSource,
    /// Attributes bound to `?` markers, in order
    pub sql_params: SqlParams,
    /// Statements per commit
    pub transaction_size: u32,
}

/// Validate `request` for a stage consuming `input` and produce its descriptor.
///
/// Fails with an invalid-configuration error, before anything reaches an
/// engine, when:
/// - a non-default driver class is given without a driver library
/// - the driver library (or a TLS store) is not an existing file
/// - both or neither of `sql` / `sql_attribute` are given (neither is fine
///   on a stream of the common string schema)
/// - `sql_attribute` or a `sql_params` entry is not an input attribute
/// - a field is out of range (`transaction_size` of 0, empty name)
///
/// The only side effect is a metadata lookup of the configured files.
pub fn build_request(
    input: &StreamRef,
    credentials: Credentials,
    request: &StatementRequest,
) -> Result<RequestDescriptor> {
    let driver = request.driver();
    driver.validate()?;
    request.tls.validate()?;

    request
        .validate()
        .map_err(|e| Error::config(format!("statement request: {}", e)))?;

    let statement = StatementSource::resolve(
        request.sql.as_deref(),
        request.sql_attribute.as_deref(),
        input.schema(),
    )?;
    request.sql_params.check_against(input.schema())?;

    if let Some(sql) = statement.literal() {
        let markers = count_placeholders(sql);
        if markers != request.sql_params.len() {
            warn!(
                markers,
                params = request.sql_params.len(),
                sql = %sql,
                "Parameter marker count does not match sql_params"
            );
        }
    }

    let output_schema = request
        .schema
        .clone()
        .unwrap_or_else(|| input.schema().clone());

    debug!(
        input = %input,
        driver_class = driver.effective_class(),
        output_schema = %output_schema,
        params = %request.sql_params,
        "Statement request validated"
    );

    Ok(RequestDescriptor {
        name: request.name.clone(),
        input: input.clone(),
        output_schema,
        credentials,
        driver,
        tls: request.tls.clone(),
        statement,
        sql_params: request.sql_params.clone(),
        transaction_size: request.transaction_size,
    })
}
