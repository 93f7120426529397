use crate::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Why a node did not execute in a run or propagation batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Only reachable through execution edges that did not fire.
    Pruned,
    /// A required input comes from a node that was pruned.
    UpstreamPruned,
    /// A required input comes from a node that failed.
    UpstreamFailed,
    /// Reactive recomputation: a data dependency has no result yet.
    MissingDependencies,
}

/// A recorded per-node execution error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub message: String,
    /// Messages of the error's source chain, outermost first.
    pub chain: Vec<String>,
}

impl NodeFailure {
    pub fn from_error(node_id: impl Into<NodeId>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            node_id: node_id.into(),
            message: error.to_string(),
            chain,
        }
    }
}
