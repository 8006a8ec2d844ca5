//! # sqlstage
//!
//! Validated SQL statement stages for streaming pipelines.
//!
//! A statement stage consumes a stream of tuples and runs one SQL statement
//! per tuple against a JDBC-accessible database. This crate builds and
//! validates the request describing such a stage, and ships a reference
//! engine and local runner to execute it.
//!
//! ## Features
//!
//! - **Request validation**: driver class and archive, SQL source, bind
//!   parameters and TLS stores are checked before anything reaches an engine
//! - **Flexible SQL sources**: one literal statement for every tuple, or
//!   per-tuple SQL read from a string attribute
//! - **Parameter binding**: `?` markers bound from named input attributes
//! - **Grouped commits**: `transaction_size` statements per transaction
//! - **Pluggable execution**: [`ExecutionEngine`](engine::ExecutionEngine)
//!   and [`ConnectionFactory`](connection::ConnectionFactory) traits
//! - **Secret hygiene**: credentials are redacted in logs and serialized output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlstage::prelude::*;
//!
//! let mut topo = Topology::new("sample");
//! let statements = topo.source_strings([
//!     "CREATE TABLE RUN_SAMPLE (A CHAR(10), B CHAR(10))",
//!     "INSERT INTO RUN_SAMPLE (A, B) VALUES ('hello', 'world')",
//! ]);
//! let results = topo.run_statement(&statements, Credentials::from_env("DB2_CREDENTIALS")?, StatementRequest::default())?;
//!
//! let runner = LocalRunner::new(ConnectionEngine::new(my_factory));
//! let run = runner.run(&topo).await?;
//! assert_eq!(run.tuple_count(&results), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod credentials;
pub mod driver;
pub mod engine;
pub mod error;
pub mod request;
pub mod runner;
pub mod schema;
pub mod security;
pub mod statement;
pub mod testing;
pub mod topology;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and tuple model
    pub use crate::schema::{Attribute, AttributeType, StreamSchema, STRING_ATTRIBUTE};
    pub use crate::types::{Row, Tuple, Value};

    // Requests
    pub use crate::credentials::{Credentials, SensitiveString};
    pub use crate::driver::{DriverConfig, StoreConfig, TlsConfig, DEFAULT_DRIVER_CLASS};
    pub use crate::request::{
        build_request, RequestDescriptor, StatementRequest, StatementRequestBuilder,
    };
    pub use crate::statement::{SqlParams, StatementSource};

    // Topology
    pub use crate::topology::{Stage, StageKind, StreamId, StreamRef, Topology};

    // Execution
    pub use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, Transaction};
    pub use crate::engine::{
        AtomicEngineStats, ConnectionEngine, EngineStats, ExecutionEngine, ResultStream,
        TupleStream,
    };
    pub use crate::runner::{LocalRunner, RunResult};

    // Configuration
    pub use crate::config::StageConfig;
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _value = Value::Int32(42);
        let _config = ConnectionConfig::new("jdbc:db2://localhost:50000/BLUDB");
        let _request = StatementRequestBuilder::new().build();
        let _schema = StreamSchema::string();
    }

    #[test]
    fn test_default_driver_class() {
        assert_eq!(DEFAULT_DRIVER_CLASS, "com.ibm.db2.jcc.DB2Driver");
        assert_eq!(DriverConfig::default().effective_class(), DEFAULT_DRIVER_CLASS);
    }
}
