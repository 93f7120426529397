//! Incremental recomputation for interactive editing.
//!
//! Changes are coalesced in a pending set; the first change in a window
//! schedules a single flush that sleeps for the debounce delay, drains the
//! set and recomputes the union of everything downstream of the drained
//! nodes, once each, in execution order.

use crate::executor::{FlowExecutor, NodeOutcome};
use chrono::Utc;
use graphcore::{
    ConfigMap, EdgeSpec, EventBus, ExecutionContext, ExecutionEvent, Graph, GraphError, Node,
    NodeId, NodeOutput, RunId,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Latest result per node, shared with whoever observes the engine
pub type ResultStore = Arc<RwLock<HashMap<NodeId, Arc<NodeOutput>>>>;

#[derive(Default)]
struct Pending {
    nodes: BTreeSet<NodeId>,
    scheduled: bool,
}

struct Workspace {
    graph: Graph,
    configs: ConfigMap,
}

struct Shared {
    executor: Arc<FlowExecutor>,
    events: Arc<EventBus>,
    context: ExecutionContext,
    workspace: RwLock<Workspace>,
    results: ResultStore,
    pending: Mutex<Pending>,
    /// Held for the duration of a batch so batches never overlap.
    batch: tokio::sync::Mutex<()>,
    debounce: Duration,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct ReactiveEngine {
    shared: Arc<Shared>,
}

impl ReactiveEngine {
    pub fn new(
        executor: Arc<FlowExecutor>,
        events: Arc<EventBus>,
        graph: Graph,
        configs: ConfigMap,
        context: ExecutionContext,
        debounce: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                events,
                context,
                workspace: RwLock::new(Workspace { graph, configs }),
                results: ResultStore::default(),
                pending: Mutex::new(Pending::default()),
                batch: tokio::sync::Mutex::new(()),
                debounce,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn results(&self) -> ResultStore {
        self.shared.results.clone()
    }

    pub async fn result(&self, node_id: &str) -> Option<Arc<NodeOutput>> {
        self.shared.results.read().await.get(node_id).cloned()
    }

    /// Load results without triggering propagation.
    pub async fn seed(&self, results: HashMap<NodeId, Arc<NodeOutput>>) {
        self.shared.results.write().await.extend(results);
    }

    /// Store a node's new result. Propagates only when `output` is a
    /// different allocation from the stored one; returns whether it did.
    pub async fn record_result(&self, node_id: impl Into<NodeId>, output: Arc<NodeOutput>) -> bool {
        let node_id = node_id.into();
        let changed = {
            let mut results = self.shared.results.write().await;
            let changed = results
                .get(&node_id)
                .map_or(true, |previous| !Arc::ptr_eq(previous, &output));
            results.insert(node_id.clone(), output);
            changed
        };

        if changed {
            self.notify_changed(node_id);
        } else {
            tracing::debug!("Result of {} unchanged, not propagating", node_id);
        }
        changed
    }

    /// Queue downstream recomputation of `node_id`. Must be called from
    /// within a tokio runtime.
    pub fn notify_changed(&self, node_id: impl Into<NodeId>) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }

        let schedule = {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.nodes.insert(node_id.into());
            !std::mem::replace(&mut pending.scheduled, true)
        };

        if schedule {
            let shared = self.shared.clone();
            tokio::spawn(async move { shared.flush_after_debounce().await });
        }
    }

    /// Replace the graph and configuration used by later batches. Results
    /// of nodes that no longer exist are dropped.
    pub async fn update_graph(
        &self,
        nodes: Vec<Node>,
        edges: Vec<EdgeSpec>,
        configs: ConfigMap,
    ) -> Result<(), GraphError> {
        let graph = Graph::new(nodes, edges)?;
        self.shared
            .results
            .write()
            .await
            .retain(|node_id, _| graph.contains(node_id));
        *self.shared.workspace.write().await = Workspace { graph, configs };
        Ok(())
    }

    /// Cancel any scheduled flush and ignore further notifications.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.nodes.clear();
        pending.scheduled = false;
    }
}

impl Shared {
    async fn flush_after_debounce(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.debounce) => {}
        }

        let origins = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.scheduled = false;
            std::mem::take(&mut pending.nodes)
        };
        if !origins.is_empty() {
            self.propagate(origins).await;
        }
    }

    async fn propagate(&self, origins: BTreeSet<NodeId>) {
        let _batch = self.batch.lock().await;
        let batch_id = RunId::new_v4();
        let workspace = self.workspace.read().await;
        let graph = &workspace.graph;

        let targets: HashSet<NodeId> = origins
            .iter()
            .filter(|origin| graph.contains(origin))
            .flat_map(|origin| graph.downstream_of(origin))
            .collect();

        let order = match graph.execution_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!("Propagation {} abandoned: {}", batch_id, e);
                return;
            }
        };

        tracing::debug!(
            "Propagation {} from {:?}: {} downstream nodes",
            batch_id,
            origins,
            targets.len()
        );

        let mut visited = HashSet::new();
        let mut recomputed = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        for node_id in order.into_iter().filter(|id| targets.contains(*id)) {
            if !visited.insert(node_id) {
                continue;
            }

            let snapshot = self.results.read().await.clone();
            let ready = graph
                .data_predecessors(node_id)
                .iter()
                .all(|pred| snapshot.contains_key(*pred));
            if !ready {
                tracing::warn!("Not recomputing {}: a dependency has no result", node_id);
                self.results.write().await.remove(node_id);
                skipped.push(node_id.to_string());
                continue;
            }

            let outcome = self
                .executor
                .execute_node(batch_id, graph, node_id, &workspace.configs, &snapshot, &self.context)
                .await;
            match outcome {
                NodeOutcome::Completed(output) => {
                    self.results
                        .write()
                        .await
                        .insert(node_id.to_string(), Arc::new(output));
                    recomputed.push(node_id.to_string());
                }
                // a stale result would feed later nodes
                NodeOutcome::Skipped(_) => {
                    self.results.write().await.remove(node_id);
                    skipped.push(node_id.to_string());
                }
                NodeOutcome::Failed(_) => {
                    self.results.write().await.remove(node_id);
                    failed.push(node_id.to_string());
                }
            }
        }

        tracing::info!(
            "Propagation {} recomputed {} nodes, skipped {}, failed {}",
            batch_id,
            recomputed.len(),
            skipped.len(),
            failed.len()
        );
        self.events.emit(ExecutionEvent::PropagationCompleted {
            batch_id,
            origins: origins.into_iter().collect(),
            recomputed,
            skipped,
            failed,
            timestamp: Utc::now(),
        });
    }
}
