use crate::{GraphError, Value};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeFiltered, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

pub type NodeId = String;

/// Per-node configuration, keyed by field name.
pub type NodeConfig = BTreeMap<String, Value>;

/// Configuration for every node of a graph, held apart from the topology.
pub type ConfigMap = HashMap<NodeId, NodeConfig>;

/// `edgeType` value that marks an edge as control flow.
pub const EXECUTION_EDGE_MARKER: &str = "execution";

/// Handle id prefix reserved for control-flow handles.
pub const EXECUTION_HANDLE_PREFIX: &str = "exec-";

pub fn is_execution_handle(handle: &str) -> bool {
    handle.starts_with(EXECUTION_HANDLE_PREFIX)
}

/// A node placed on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Node position in the visual editor; opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Edge as it arrives from a flow document, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    pub id: String,
    pub source: NodeId,
    pub source_handle: String,
    pub target: NodeId,
    pub target_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

impl EdgeSpec {
    pub fn new(
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) -> Self {
        let (source, source_handle) = (source.into(), source_handle.into());
        let (target, target_handle) = (target.into(), target_handle.into());
        Self {
            id: format!("{source}:{source_handle}->{target}:{target_handle}"),
            source,
            source_handle,
            target,
            target_handle,
            edge_type: None,
        }
    }

    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    pub fn is_execution(&self) -> bool {
        self.edge_type.as_deref() == Some(EXECUTION_EDGE_MARKER) || legacy_execution_handles(self)
    }

    pub fn classify(self) -> Edge {
        let execution = self.is_execution();
        let link = Link {
            id: self.id,
            source: self.source,
            source_handle: self.source_handle,
            target: self.target,
            target_handle: self.target_handle,
        };
        if execution {
            Edge::Execution(link)
        } else {
            Edge::Data(link)
        }
    }
}

/// Compatibility path for documents saved before `edgeType` existed: the
/// handle naming convention alone decides the edge kind.
fn legacy_execution_handles(spec: &EdgeSpec) -> bool {
    is_execution_handle(&spec.source_handle) || is_execution_handle(&spec.target_handle)
}

/// Endpoints of a classified edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source: NodeId,
    pub source_handle: String,
    pub target: NodeId,
    pub target_handle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Data,
    Execution,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    Data(Link),
    Execution(Link),
}

impl Edge {
    pub fn link(&self) -> &Link {
        match self {
            Edge::Data(link) | Edge::Execution(link) => link,
        }
    }

    pub fn kind(&self) -> EdgeKind {
        match self {
            Edge::Data(_) => EdgeKind::Data,
            Edge::Execution(_) => EdgeKind::Execution,
        }
    }
}

/// Immutable-per-run view over nodes and classified edges.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    indices: HashMap<NodeId, NodeIndex>,
    dag: DiGraph<NodeId, EdgeKind>,
}

impl Graph {
    /// Build and structurally validate a graph.
    pub fn new(nodes: Vec<Node>, edges: Vec<EdgeSpec>) -> Result<Self, GraphError> {
        let mut dag = DiGraph::new();
        let mut indices = HashMap::new();

        for node in &nodes {
            if indices.contains_key(&node.id) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
            let idx = dag.add_node(node.id.clone());
            indices.insert(node.id.clone(), idx);
        }

        let mut seen = HashSet::new();
        let mut classified = Vec::with_capacity(edges.len());
        for spec in edges {
            let from = *indices.get(&spec.source).ok_or_else(|| GraphError::DanglingEdge {
                edge_id: spec.id.clone(),
                node_id: spec.source.clone(),
                side: "source",
            })?;
            let to = *indices.get(&spec.target).ok_or_else(|| GraphError::DanglingEdge {
                edge_id: spec.id.clone(),
                node_id: spec.target.clone(),
                side: "target",
            })?;

            let key = (
                spec.source.clone(),
                spec.source_handle.clone(),
                spec.target.clone(),
                spec.target_handle.clone(),
            );
            if !seen.insert(key) {
                return Err(GraphError::DuplicateEdge {
                    source_node: spec.source,
                    source_handle: spec.source_handle,
                    target_node: spec.target,
                    target_handle: spec.target_handle,
                });
            }

            let edge = spec.classify();
            dag.add_edge(from, to, edge.kind());
            classified.push(edge);
        }

        Ok(Self {
            nodes,
            edges: classified,
            indices,
            dag,
        })
    }

    pub fn from_document(document: &FlowDocument) -> Result<Self, GraphError> {
        Self::new(document.nodes.clone(), document.edges.clone())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.indices.get(id).map(|idx| &self.nodes[idx.index()])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.indices.contains_key(id)
    }

    /// Distinct node types in first-seen order.
    pub fn all_types(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .map(|n| n.node_type.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    pub fn data_edges_into<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.edges.iter().filter_map(move |edge| match edge {
            Edge::Data(link) if link.target == id => Some(link),
            _ => None,
        })
    }

    pub fn data_edges_out_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.edges.iter().filter_map(move |edge| match edge {
            Edge::Data(link) if link.source == id => Some(link),
            _ => None,
        })
    }

    pub fn execution_edges_into<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.edges.iter().filter_map(move |edge| match edge {
            Edge::Execution(link) if link.target == id => Some(link),
            _ => None,
        })
    }

    pub fn execution_edges_out_of<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.edges.iter().filter_map(move |edge| match edge {
            Edge::Execution(link) if link.source == id => Some(link),
            _ => None,
        })
    }

    /// Distinct data-edge sources of `id`, in edge order.
    pub fn data_predecessors<'a>(&'a self, id: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.data_edges_into(id)
            .map(|link| link.source.as_str())
            .filter(|source| seen.insert(*source))
            .collect()
    }

    /// Topological order over both edge kinds. Ties are broken by node
    /// insertion order, so unconnected nodes run in declaration order.
    pub fn execution_order(&self) -> Result<Vec<&str>, GraphError> {
        let mut in_degree: Vec<usize> = self
            .dag
            .node_indices()
            .map(|idx| self.dag.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(self.nodes[i].id.as_str());
            for edge in self.dag.edges_directed(NodeIndex::new(i), Direction::Outgoing) {
                let target = edge.target().index();
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::CyclicDependency);
        }
        Ok(order)
    }

    /// Every node reachable from `id` through data edges, excluding `id`.
    pub fn downstream_of(&self, id: &str) -> HashSet<NodeId> {
        let Some(start) = self.indices.get(id) else {
            return HashSet::new();
        };
        let data_only = EdgeFiltered::from_fn(&self.dag, |edge| *edge.weight() == EdgeKind::Data);
        let mut bfs = Bfs::new(&data_only, *start);
        let mut reached = HashSet::new();
        while let Some(idx) = bfs.next(&data_only) {
            if idx != *start {
                reached.insert(self.dag[idx].clone());
            }
        }
        reached
    }
}

/// On-disk flow document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub node_config_by_node_id: ConfigMap,
    #[serde(default)]
    pub input_data: BTreeMap<String, Value>,
}

impl FlowDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, node: Node, config: NodeConfig) -> NodeId {
        let id = node.id.clone();
        self.node_config_by_node_id.insert(id.clone(), config);
        self.nodes.push(node);
        id
    }

    pub fn connect(
        &mut self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) {
        self.edges
            .push(EdgeSpec::new(source, source_handle, target, target_handle));
    }

    pub fn connect_execution(
        &mut self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) {
        self.edges.push(
            EdgeSpec::new(source, source_handle, target, target_handle)
                .with_edge_type(EXECUTION_EDGE_MARKER),
        );
    }
}
