//! Builder API for constructing graphs
//!
//! [`StateGraph`] collects nodes and edges, then [`compile`](StateGraph::compile)
//! validates the structure and binds it to a [`StateSchema`]. The result is
//! immutable: graphs are built once at process start and only read afterwards.
//!
//! ```rust
//! use gategraph_core::{FieldKind, FnNode, GraphError, NodeOutcome, StateGraph, StateSchema, StateUpdate};
//!
//! let schema = StateSchema::from_fields([("greeting", FieldKind::Overwrite)])?;
//!
//! let mut graph = StateGraph::new();
//! graph
//!     .add_fn_node("greet", |_state, _ctx| async {
//!         Ok::<_, GraphError>(NodeOutcome::from(StateUpdate::new().set("greeting", "hello")))
//!     })
//!     .set_entry("greet")
//!     .add_finish("greet");
//!
//! let compiled = graph.compile(schema)?;
//! assert_eq!(compiled.entry(), "greet");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{GraphError, Result};
use crate::graph::{CompiledGraph, Edge, Graph, NodeId, END, START};
use crate::node::{FnNode, Node, NodeContext, NodeOutcome};
use crate::state::{StateRecord, StateSchema};
use std::future::Future;
use std::sync::Arc;

/// Builder for [`CompiledGraph`]
#[derive(Default)]
pub struct StateGraph {
    graph: Graph,
    duplicates: Vec<NodeId>,
}

impl StateGraph {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    ///
    /// Adding the same name twice is reported by [`compile`](Self::compile).
    pub fn add_node(&mut self, id: impl Into<NodeId>, node: impl Node + 'static) -> &mut Self {
        self.add_shared_node(id, Arc::new(node))
    }

    /// Add a node that is already behind an `Arc`
    pub fn add_shared_node(&mut self, id: impl Into<NodeId>, node: Arc<dyn Node>) -> &mut Self {
        let id = id.into();
        if self.graph.nodes.insert(id.clone(), node).is_some() {
            self.duplicates.push(id);
        } else {
            self.graph.order.push(id);
        }
        self
    }

    /// Add a node from an async closure
    pub fn add_fn_node<F, Fut>(&mut self, id: impl Into<NodeId>, f: F) -> &mut Self
    where
        F: Fn(StateRecord, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
    {
        self.add_node(id, FnNode::new(f))
    }

    /// Add an unconditional edge
    ///
    /// An edge out of [`START`] sets the entry node.
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let from = from.into();
        let to = to.into();
        if from == START {
            self.graph.entry = Some(to);
        } else {
            self.graph.edges.entry(from).or_default().push(Edge::Direct(to));
        }
        self
    }

    /// Add an edge taken when `condition` holds on the post-update state
    pub fn add_conditional_edge<C>(
        &mut self,
        from: impl Into<NodeId>,
        name: impl Into<String>,
        to: impl Into<NodeId>,
        condition: C,
    ) -> &mut Self
    where
        C: Fn(&StateRecord) -> bool + Send + Sync + 'static,
    {
        self.graph
            .edges
            .entry(from.into())
            .or_default()
            .push(Edge::Conditional {
                name: name.into(),
                condition: Arc::new(condition),
                target: to.into(),
            });
        self
    }

    /// Set the entry point of the graph
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.entry = Some(node.into());
        self
    }

    /// Add an edge from `node` to [`END`]
    pub fn add_finish(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(node, END)
    }

    /// Validate the structure and bind it to `schema`
    pub fn compile(self, schema: StateSchema) -> Result<CompiledGraph> {
        if let Some(name) = self.duplicates.first() {
            return Err(GraphError::Validation(format!(
                "Node {} is defined more than once",
                name
            )));
        }
        let compiled = CompiledGraph::new(self.graph, schema)?;
        tracing::debug!(
            entry = compiled.entry(),
            nodes = compiled.node_names().len(),
            "compiled graph"
        );
        Ok(compiled)
    }
}
