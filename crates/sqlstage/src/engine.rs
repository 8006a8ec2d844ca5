//! Execution engines
//!
//! An [`ExecutionEngine`] receives a validated [`RequestDescriptor`] together
//! with the tuples of the consumed stream and yields the stage's result
//! tuples. [`ConnectionEngine`] is the reference implementation: it runs
//! every statement over one [`Connection`] opened through a
//! [`ConnectionFactory`].
//!
//! Result shaping:
//! - statements returning rows (`SELECT`, `WITH`, `VALUES`) emit one result
//!   tuple per row, none for an empty result set
//! - every other statement emits one result tuple per input tuple
//! - result attributes are filled from the row, then the input tuple, then
//!   the type default (see [`StreamSchema::shape`](crate::schema::StreamSchema::shape))
//!
//! With `transaction_size > 1` results are held back until their transaction
//! commits. Results of a rolled back transaction are never emitted.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, Transaction};
use crate::error::{Error, Result};
use crate::request::RequestDescriptor;
use crate::statement::returns_rows;
use crate::types::{Row, Tuple, Value};

/// Tuples consumed by a stage
pub type TupleStream = BoxStream<'static, Tuple>;

/// Result tuples produced by a stage. The stream ends after the first error.
pub type ResultStream = BoxStream<'static, Result<Tuple>>;

/// Runs statement stages
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Start executing `request` over `input`
    async fn submit(&self, request: RequestDescriptor, input: TupleStream) -> Result<ResultStream>;
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    /// Statements executed successfully
    pub statements_executed: u64,
    /// Statements that failed
    pub statements_failed: u64,
    /// Rows returned by queries
    pub rows_returned: u64,
    /// Rows reported as affected by updates
    pub rows_affected: u64,
    /// Transactions committed
    pub commits: u64,
    /// Total execution time (milliseconds)
    pub total_execution_time_ms: u64,
}

/// Lock-free engine statistics
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicEngineStats {
    pub statements_executed: AtomicU64,
    pub statements_failed: AtomicU64,
    pub rows_returned: AtomicU64,
    pub rows_affected: AtomicU64,
    pub commits: AtomicU64,
    pub total_execution_time_ms: AtomicU64,
}

impl AtomicEngineStats {
    /// Record a successful statement
    pub fn record_statement(&self, rows_returned: u64, rows_affected: u64, duration: Duration) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
        self.rows_returned.fetch_add(rows_returned, Ordering::Relaxed);
        self.rows_affected.fetch_add(rows_affected, Ordering::Relaxed);
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_execution_time_ms
            .fetch_add(millis, Ordering::Relaxed);
    }

    /// Record a failed statement
    pub fn record_failure(&self) {
        self.statements_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a commit
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            statements_failed: self.statements_failed.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
            rows_affected: self.rows_affected.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            total_execution_time_ms: self.total_execution_time_ms.load(Ordering::Relaxed),
        }
    }
}

/// Executor abstraction so statements run the same way with or without an
/// open transaction
enum StatementExecutor<'a> {
    Connection(&'a dyn Connection),
    Transaction(&'a dyn Transaction),
}

impl StatementExecutor<'_> {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        match self {
            Self::Connection(conn) => conn.query(sql, params).await,
            Self::Transaction(tx) => tx.query(sql, params).await,
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        match self {
            Self::Connection(conn) => conn.execute(sql, params).await,
            Self::Transaction(tx) => tx.execute(sql, params).await,
        }
    }
}

/// Reference engine executing statements over a [`Connection`]
pub struct ConnectionEngine<F: ConnectionFactory> {
    factory: Arc<F>,
    stats: Arc<AtomicEngineStats>,
}

impl<F: ConnectionFactory> ConnectionEngine<F> {
    /// Create an engine opening connections through `factory`
    pub fn new(factory: F) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Create an engine sharing an existing factory
    pub fn with_factory(factory: Arc<F>) -> Self {
        Self {
            factory,
            stats: Arc::new(AtomicEngineStats::default()),
        }
    }

    /// Statistics across every stage this engine has run
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }
}

#[async_trait]
impl<F: ConnectionFactory + 'static> ExecutionEngine for ConnectionEngine<F> {
    async fn submit(&self, request: RequestDescriptor, input: TupleStream) -> Result<ResultStream> {
        let config = ConnectionConfig::from_credentials(&request.credentials, &request.driver, &request.tls)?;
        let conn = self.factory.connect(&config).await?;

        info!(
            input = %request.input,
            driver_class = request.driver.effective_class(),
            transaction_size = request.transaction_size,
            "Statement stage connected"
        );

        let execution = Execution {
            request,
            conn,
            tx: None,
            uncommitted: 0,
            input,
            pending: VecDeque::new(),
            held: Vec::new(),
            stats: self.stats.clone(),
            finished: false,
        };

        Ok(stream::unfold(execution, |mut execution| async move {
            execution.next().await.map(|item| (item, execution))
        })
        .boxed())
    }
}

/// State of one running stage
struct Execution {
    request: RequestDescriptor,
    conn: Box<dyn Connection>,
    tx: Option<Box<dyn Transaction>>,
    uncommitted: u32,
    input: TupleStream,
    pending: VecDeque<Tuple>,
    held: Vec<Tuple>,
    stats: Arc<AtomicEngineStats>,
    finished: bool,
}

impl Execution {
    async fn next(&mut self) -> Option<Result<Tuple>> {
        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Some(Ok(tuple));
            }
            if self.finished {
                return None;
            }

            match self.input.next().await {
                Some(tuple) => match self.process(&tuple).await {
                    Ok(()) => {}
                    Err(e) => {
                        self.stats.record_failure();
                        error!(error = %e, input = %self.request.input, "Statement failed");
                        self.abort().await;
                        self.finished = true;
                        return Some(Err(e));
                    }
                },
                None => {
                    self.finished = true;
                    if let Err(e) = self.finish().await {
                        return Some(Err(e));
                    }
                }
            }
        }
    }

    async fn process(&mut self, tuple: &Tuple) -> Result<()> {
        let sql = self.request.statement.sql_for(tuple)?.to_string();
        let params = self.request.sql_params.bind(tuple)?;

        if self.request.transaction_size > 1 && self.tx.is_none() {
            self.tx = Some(self.conn.begin().await?);
        }

        let start = Instant::now();
        let results = {
            let executor = match &self.tx {
                Some(tx) => StatementExecutor::Transaction(tx.as_ref()),
                None => StatementExecutor::Connection(self.conn.as_ref()),
            };
            let schema = &self.request.output_schema;

            if returns_rows(&sql) {
                let rows = executor.query(&sql, &params).await?;
                self.stats
                    .record_statement(rows.len() as u64, 0, start.elapsed());
                debug!(sql = %sql, rows = rows.len(), "Query executed");
                rows.iter()
                    .map(|row| schema.shape(tuple, Some(row)))
                    .collect::<Result<Vec<_>>>()?
            } else {
                let affected = executor.execute(&sql, &params).await?;
                self.stats.record_statement(0, affected, start.elapsed());
                debug!(sql = %sql, affected, "Statement executed");
                vec![schema.shape(tuple, None)?]
            }
        };

        if self.tx.is_none() {
            self.pending.extend(results);
            return Ok(());
        }

        self.held.extend(results);
        self.uncommitted += 1;
        if self.uncommitted >= self.request.transaction_size {
            self.commit().await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(|e| {
                Error::transaction(format!(
                    "commit of {} statements failed: {}",
                    self.uncommitted, e
                ))
            })?;
            self.stats.record_commit();
            debug!(statements = self.uncommitted, "Transaction committed");
            self.uncommitted = 0;
            self.pending.extend(self.held.drain(..));
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.commit().await?;
        self.conn.close().await
    }

    async fn abort(&mut self) {
        if !self.held.is_empty() {
            debug!(dropped = self.held.len(), "Discarding results of uncommitted statements");
            self.held.clear();
        }
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback after failed statement failed");
            }
        }
        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "Closing connection after failed statement failed");
        }
    }
}
