//! Local topology runner
//!
//! Evaluates every stage of a [`Topology`] in order, in process. Statement
//! stages go through an [`ExecutionEngine`]; sources and maps are evaluated
//! directly. The first failing stage aborts the run.

use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, info};

use crate::engine::ExecutionEngine;
use crate::error::{Error, Result};
use crate::topology::{StageKind, StreamRef, Topology};
use crate::types::Tuple;

/// Tuples produced by each stream of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    outputs: Vec<Vec<Tuple>>,
}

impl RunResult {
    /// Tuples emitted on `stream`, in emission order
    pub fn tuples(&self, stream: &StreamRef) -> &[Tuple] {
        self.outputs
            .get(stream.id().index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of tuples emitted on `stream`
    pub fn tuple_count(&self, stream: &StreamRef) -> usize {
        self.tuples(stream).len()
    }

    /// Tuples across every stream
    pub fn total_tuples(&self) -> usize {
        self.outputs.iter().map(Vec::len).sum()
    }
}

/// Runs topologies to completion against one engine
pub struct LocalRunner<E: ExecutionEngine> {
    engine: E,
}

impl<E: ExecutionEngine> LocalRunner<E> {
    /// Create a runner submitting statement stages to `engine`
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// The engine statement stages are submitted to
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Evaluate every stage of `topology`
    pub async fn run(&self, topology: &Topology) -> Result<RunResult> {
        let start = Instant::now();
        let mut outputs: Vec<Vec<Tuple>> = Vec::with_capacity(topology.stages().len());

        for stage in topology.stages() {
            let tuples = match &stage.kind {
                StageKind::Source { tuples } => tuples.clone(),
                StageKind::Map { input, func } => {
                    let schema = stage.output.schema();
                    input_tuples(&outputs, input.index())?
                        .iter()
                        .map(|tuple| {
                            let mapped = func(tuple)?;
                            schema.check(&mapped)?;
                            Ok(mapped)
                        })
                        .collect::<Result<Vec<_>>>()?
                }
                StageKind::Statement(descriptor) => {
                    let input = input_tuples(&outputs, descriptor.input.id().index())?.to_vec();
                    let mut results = self
                        .engine
                        .submit(descriptor.as_ref().clone(), stream::iter(input).boxed())
                        .await?;

                    let mut tuples = Vec::new();
                    while let Some(result) = results.next().await {
                        tuples.push(result?);
                    }
                    tuples
                }
            };

            debug!(stage = %stage.output, tuples = tuples.len(), "Stage completed");
            outputs.push(tuples);
        }

        info!(
            topology = topology.name(),
            stages = outputs.len(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Topology run completed"
        );
        Ok(RunResult { outputs })
    }
}

fn input_tuples(outputs: &[Vec<Tuple>], index: usize) -> Result<&[Tuple]> {
    outputs
        .get(index)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::internal(format!("stream #{} consumed before it was produced", index)))
}
