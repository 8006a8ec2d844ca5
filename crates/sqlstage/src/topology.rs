//! Topology model
//!
//! A [`Topology`] is a graph of stages, each producing exactly one stream.
//! Stages can only consume streams created before them, so the order in
//! which stages are added is a valid evaluation order.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::request::{build_request, RequestDescriptor, StatementRequest};
use crate::schema::StreamSchema;
use crate::types::Tuple;

static NEXT_TOPOLOGY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a stream within its topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(usize);

impl StreamId {
    /// Position of the producing stage
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Reference to a stream: what a consuming stage attaches to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRef {
    topology: u64,
    id: StreamId,
    name: String,
    schema: StreamSchema,
}

impl StreamRef {
    /// Stream identifier
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Name of the producing stage
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema of the tuples on this stream
    pub fn schema(&self) -> &StreamSchema {
        &self.schema
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.0)
    }
}

/// Tuple transformation applied by a map stage
pub type MapFn = Arc<dyn Fn(&Tuple) -> Result<Tuple> + Send + Sync>;

/// What a stage does
#[derive(Clone)]
pub enum StageKind {
    /// Emits a fixed list of tuples
    Source {
        /// Tuples in emission order
        tuples: Vec<Tuple>,
    },
    /// Transforms each input tuple into one output tuple
    Map {
        /// Consumed stream
        input: StreamId,
        /// Transformation
        func: MapFn,
    },
    /// Runs SQL statements through an execution engine
    Statement(Box<RequestDescriptor>),
}

impl fmt::Debug for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source { tuples } => f.debug_struct("Source").field("tuples", &tuples.len()).finish(),
            Self::Map { input, .. } => f.debug_struct("Map").field("input", input).finish(),
            Self::Statement(descriptor) => f.debug_tuple("Statement").field(descriptor).finish(),
        }
    }
}

/// A processing stage and the stream it produces
#[derive(Debug, Clone)]
pub struct Stage {
    /// Stage kind
    pub kind: StageKind,
    /// Produced stream
    pub output: StreamRef,
}

impl Stage {
    /// Stage name (same as its output stream's name)
    pub fn name(&self) -> &str {
        self.output.name()
    }

    /// Stream consumed by this stage, if any
    pub fn input(&self) -> Option<StreamId> {
        match &self.kind {
            StageKind::Source { .. } => None,
            StageKind::Map { input, .. } => Some(*input),
            StageKind::Statement(descriptor) => Some(descriptor.input.id()),
        }
    }
}

/// Graph of stages
#[derive(Debug, Clone)]
pub struct Topology {
    id: u64,
    name: String,
    stages: Vec<Stage>,
}

impl Topology {
    /// Create an empty topology
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_TOPOLOGY_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Topology name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in evaluation order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage producing `stream`
    pub fn stage(&self, stream: StreamId) -> Option<&Stage> {
        self.stages.get(stream.0)
    }

    /// Source of tuples conforming to `schema`
    pub fn source(&mut self, schema: StreamSchema, tuples: Vec<Tuple>) -> Result<StreamRef> {
        for tuple in &tuples {
            schema.check(tuple)?;
        }
        let name = format!("source_{}", self.stages.len());
        Ok(self.push(name, schema, StageKind::Source { tuples }))
    }

    /// Source of strings on the common string schema
    pub fn source_strings<I, S>(&mut self, items: I) -> StreamRef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tuples = items.into_iter().map(Tuple::string).collect();
        let name = format!("source_{}", self.stages.len());
        self.push(name, StreamSchema::string(), StageKind::Source { tuples })
    }

    /// Source emitting `tuple` `iterations` times
    pub fn beacon(
        &mut self,
        schema: StreamSchema,
        tuple: Tuple,
        iterations: usize,
    ) -> Result<StreamRef> {
        self.source(schema, vec![tuple; iterations])
    }

    /// Map each tuple of `input` to a tuple of `schema`
    pub fn map<F>(&mut self, input: &StreamRef, schema: StreamSchema, func: F) -> Result<StreamRef>
    where
        F: Fn(&Tuple) -> Result<Tuple> + Send + Sync + 'static,
    {
        self.check_owned(input)?;
        let name = format!("map_{}", self.stages.len());
        let kind = StageKind::Map {
            input: input.id(),
            func: Arc::new(func),
        };
        Ok(self.push(name, schema, kind))
    }

    /// Attach a SQL statement stage consuming `input`.
    ///
    /// The request is validated with [`build_request`]; on failure nothing
    /// is attached. The returned stream carries the stage's result tuples.
    pub fn run_statement(
        &mut self,
        input: &StreamRef,
        credentials: Credentials,
        request: StatementRequest,
    ) -> Result<StreamRef> {
        self.check_owned(input)?;
        let descriptor = build_request(input, credentials, &request)?;

        let name = descriptor
            .name
            .clone()
            .unwrap_or_else(|| format!("run_statement_{}", self.stages.len()));
        let schema = descriptor.output_schema.clone();
        let stream = self.push(name, schema, StageKind::Statement(Box::new(descriptor)));

        info!(
            topology = %self.name,
            stage = %stream,
            input = %input,
            "Attached statement stage"
        );
        Ok(stream)
    }

    fn check_owned(&self, stream: &StreamRef) -> Result<()> {
        match self.stages.get(stream.id.0) {
            Some(stage) if stage.output == *stream => Ok(()),
            _ => Err(Error::config(format!(
                "stream {} does not belong to topology '{}'",
                stream, self.name
            ))),
        }
    }

    fn push(&mut self, name: String, schema: StreamSchema, kind: StageKind) -> StreamRef {
        let output = StreamRef {
            topology: self.id,
            id: StreamId(self.stages.len()),
            name,
            schema,
        };
        self.stages.push(Stage {
            kind,
            output: output.clone(),
        });
        output
    }
}
