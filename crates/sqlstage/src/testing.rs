//! Testing utilities
//!
//! Mock connections and engines for exercising statement stages without a
//! database.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlstage::prelude::*;
//! use sqlstage::testing::MockConnectionFactory;
//!
//! let factory = MockConnectionFactory::new()
//!     .with_rows("SELECT", vec![Row::new(vec!["A".into()], vec![Value::from("x")])]);
//! let runner = LocalRunner::new(ConnectionEngine::new(factory.clone()));
//!
//! let result = runner.run(&topology).await?;
//! assert_eq!(factory.executed().len(), 3);
//! ```

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, Transaction};
use crate::engine::{ExecutionEngine, ResultStream, TupleStream};
use crate::error::{Error, Result};
use crate::request::RequestDescriptor;
use crate::types::{Row, Value};

// ============================================================================
// Mock Connection
// ============================================================================

/// A statement seen by a mock connection
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// SQL text
    pub sql: String,
    /// Bound parameter values
    pub params: Vec<Value>,
    /// Whether it ran inside a transaction
    pub in_transaction: bool,
}

#[derive(Debug, Default)]
struct MockState {
    executed: Mutex<Vec<ExecutedStatement>>,
    rows: Mutex<Vec<(String, Vec<Row>)>>,
    fail_on: Mutex<Option<String>>,
    fail_connect: Mutex<bool>,
    fail_commit: Mutex<bool>,
    affected_rows: Mutex<u64>,
    configs: Mutex<Vec<ConnectionConfig>>,
    commits: Mutex<u64>,
    rollbacks: Mutex<u64>,
    closed: Mutex<u64>,
}

impl MockState {
    fn run(&self, sql: &str, params: &[Value], in_transaction: bool) -> Result<()> {
        if let Some(pattern) = self.fail_on.lock().as_deref() {
            if sql.contains(pattern) {
                return Err(Error::query_with_sql("mock failure", sql));
            }
        }
        self.executed.lock().push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
            in_transaction,
        });
        Ok(())
    }

    fn query(&self, sql: &str, params: &[Value], in_transaction: bool) -> Result<Vec<Row>> {
        self.run(sql, params, in_transaction)?;
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .find(|(prefix, _)| sql.trim_start().starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str, params: &[Value], in_transaction: bool) -> Result<u64> {
        self.run(sql, params, in_transaction)?;
        Ok(*self.affected_rows.lock())
    }
}

/// A mock connection factory; clones share recorded state
#[derive(Debug, Clone)]
pub struct MockConnectionFactory {
    state: Arc<MockState>,
}

impl Default for MockConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnectionFactory {
    /// Create a new mock factory
    pub fn new() -> Self {
        let state = MockState::default();
        *state.affected_rows.lock() = 1;
        Self {
            state: Arc::new(state),
        }
    }

    /// Return `rows` for queries starting with `prefix`
    pub fn with_rows(self, prefix: impl Into<String>, rows: Vec<Row>) -> Self {
        self.state.rows.lock().push((prefix.into(), rows));
        self
    }

    /// Fail every statement containing `pattern`
    pub fn fail_on(self, pattern: impl Into<String>) -> Self {
        *self.state.fail_on.lock() = Some(pattern.into());
        self
    }

    /// Refuse to connect
    pub fn fail_connect(self) -> Self {
        *self.state.fail_connect.lock() = true;
        self
    }

    /// Fail every commit
    pub fn fail_commit(self) -> Self {
        *self.state.fail_commit.lock() = true;
        self
    }

    /// Affected row count reported for updates
    pub fn with_affected_rows(self, count: u64) -> Self {
        *self.state.affected_rows.lock() = count;
        self
    }

    /// Statements executed so far, in order
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.executed.lock().clone()
    }

    /// Configurations connections were opened with
    pub fn configs(&self) -> Vec<ConnectionConfig> {
        self.state.configs.lock().clone()
    }

    /// Committed transactions
    pub fn commits(&self) -> u64 {
        *self.state.commits.lock()
    }

    /// Rolled back transactions
    pub fn rollbacks(&self) -> u64 {
        *self.state.rollbacks.lock()
    }

    /// Closed connections
    pub fn closed(&self) -> u64 {
        *self.state.closed.lock()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        if *self.state.fail_connect.lock() {
            return Err(Error::connection(format!("mock refused {}", config.url)));
        }
        self.state.configs.lock().push(config.clone());
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

/// A mock connection
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.state.query(sql, params, false)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.state.execute(sql, params, false)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MockTransaction {
            state: self.state.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        *self.state.closed.lock() += 1;
        Ok(())
    }
}

/// A mock transaction
#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<MockState>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.state.query(sql, params, true)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.state.execute(sql, params, true)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if *self.state.fail_commit.lock() {
            return Err(Error::connection("mock commit failure"));
        }
        *self.state.commits.lock() += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        *self.state.rollbacks.lock() += 1;
        Ok(())
    }
}

// ============================================================================
// Echo Engine
// ============================================================================

/// Engine that runs nothing: every input tuple is shaped to the output
/// schema and passed through. Submitted descriptors are recorded.
#[derive(Debug, Clone, Default)]
pub struct EchoEngine {
    submitted: Arc<Mutex<Vec<RequestDescriptor>>>,
}

impl EchoEngine {
    /// Create a new echo engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors submitted so far
    pub fn submitted(&self) -> Vec<RequestDescriptor> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ExecutionEngine for EchoEngine {
    async fn submit(&self, request: RequestDescriptor, input: TupleStream) -> Result<ResultStream> {
        self.submitted.lock().push(request.clone());
        let schema = request.output_schema;
        Ok(input.map(move |tuple| schema.shape(&tuple, None)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_connection_records_statements() {
        let factory = MockConnectionFactory::new()
            .with_rows("SELECT", vec![Row::new(vec!["A".into()], vec![Value::from("x")])]);
        let conn = factory
            .connect(&ConnectionConfig::new("jdbc:db2://h/DB"))
            .await
            .unwrap();

        assert_eq!(conn.query("SELECT A FROM T", &[]).await.unwrap().len(), 1);
        assert!(conn.query("VALUES 1", &[]).await.unwrap().is_empty());
        assert_eq!(conn.execute("DELETE FROM T", &[Value::Int32(1)]).await.unwrap(), 1);

        let executed = factory.executed();
        assert_eq!(executed.len(), 3);
        assert_eq!(executed[2].params, vec![Value::Int32(1)]);
        assert!(!executed[2].in_transaction);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let factory = MockConnectionFactory::new().fail_on("BROKEN");
        let conn = factory
            .connect(&ConnectionConfig::new("jdbc:db2://h/DB"))
            .await
            .unwrap();
        assert!(conn.execute("BROKEN STATEMENT", &[]).await.is_err());
        assert!(factory.executed().is_empty());

        let refusing = MockConnectionFactory::new().fail_connect();
        let err = refusing
            .connect(&ConnectionConfig::new("jdbc:db2://h/DB"))
            .await
            .err()
            .unwrap();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_mock_transaction() {
        let factory = MockConnectionFactory::new();
        let conn = factory
            .connect(&ConnectionConfig::new("jdbc:db2://h/DB"))
            .await
            .unwrap();

        let tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO T VALUES (1)", &[]).await.unwrap();
        tx.commit().await.unwrap();
        conn.begin().await.unwrap().rollback().await.unwrap();

        assert_eq!(factory.commits(), 1);
        assert_eq!(factory.rollbacks(), 1);
        assert!(factory.executed()[0].in_transaction);
    }
}
