//! Optimization pipeline: analysis, reducer chain, graph copy
//!
//! One pipeline run executes synchronously on the compiling thread:
//! 1. Bailout check against the tier's size limit
//! 2. Backward dead-code analysis over the input graph
//! 3. One graph-to-graph copy through the statically composed stage chain
//!
//! All per-run state (the output graph, analysis tables, snapshot storage)
//! is owned by the run and dropped in bulk when it ends; nothing is shared
//! across the pass boundary, so there is no locking anywhere in this
//! subsystem.

pub mod const_fold;
pub mod copier;
pub mod dead_code;
pub mod reduce;

use crate::ir::graph::Graph;

use self::const_fold::ConstFoldReducer;
use self::copier::GraphCopier;
use self::dead_code::DeadCodeReducer;
use self::reduce::Identity;

/// A pipeline run was abandoned; the caller falls back to unoptimized code
#[derive(Debug, thiserror::Error)]
pub enum BailoutReason {
    #[error("graph too large to optimize: {ops} operations (limit {limit})")]
    GraphTooLarge { ops: usize, limit: usize },
}

/// Which optional stages participate for a compilation tier.
///
/// Fixed when the pipeline is constructed; the chain order itself is fixed
/// at compile time.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Enable the constant-folding stage (default: true)
    pub const_fold: bool,
    /// Bail out on graphs with more operations than this (default: 50_000)
    pub max_graph_ops: usize,
}

impl Default for TierConfig {
    fn default() -> Self {
        TierConfig {
            const_fold: true,
            max_graph_ops: 50_000,
        }
    }
}

/// The optimizing middle tier: one call runs analysis plus copy
pub struct OptPipeline {
    config: TierConfig,
}

impl OptPipeline {
    /// Create a pipeline with the default tier configuration
    pub fn new() -> Self {
        OptPipeline {
            config: TierConfig::default(),
        }
    }

    /// Create a pipeline for a specific tier
    pub fn with_config(config: TierConfig) -> Self {
        OptPipeline { config }
    }

    /// The active tier configuration
    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    /// Run one full pass over `input`, producing the optimized graph.
    ///
    /// The analysis completes before the copy starts; there is no
    /// interleaving. On bailout nothing of the run survives.
    pub fn run(&self, input: &Graph) -> Result<Graph, BailoutReason> {
        if input.op_count() > self.config.max_graph_ops {
            return Err(BailoutReason::GraphTooLarge {
                ops: input.op_count(),
                limit: self.config.max_graph_ops,
            });
        }

        let output = if self.config.const_fold {
            let chain = DeadCodeReducer::new(input, ConstFoldReducer::new(Identity));
            GraphCopier::new(chain).run(input)
        } else {
            let chain = DeadCodeReducer::new(input, Identity);
            GraphCopier::new(chain).run(input)
        };
        Ok(output)
    }
}

impl Default for OptPipeline {
    fn default() -> Self {
        Self::new()
    }
}
