//! Graph structure, validation and routing
//!
//! A [`Graph`] is a set of named nodes, one entry node and outgoing edges.
//! A node without outgoing edges ends the walk. Edges are evaluated only
//! after the source node returns normally, against the post-update state.
//!
//! ```text
//!  compliance_check ──► risk_check ──► decision ──► gate ──► drafting ──► END
//!
//!  review ──[approve]──► publish
//!     └────[reject]───► END          exactly one condition must hold
//! ```
//!
//! A node has either at most one direct edge or only conditional edges. With
//! conditional edges exactly one condition must evaluate true; zero or more
//! than one is a [`GraphError::Configuration`].

use crate::error::{GraphError, Result};
use crate::node::Node;
use crate::state::{StateRecord, StateSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// Node identifier
pub type NodeId = String;

/// Reserved marker for the start of a walk (diagrams only)
pub const START: &str = "__start__";

/// Reserved edge target that ends the walk
pub const END: &str = "__end__";

/// Predicate over the post-update state record
pub type Condition = Arc<dyn Fn(&StateRecord) -> bool + Send + Sync>;

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    /// Unconditional edge
    Direct(NodeId),

    /// Edge taken when `condition` holds
    Conditional {
        /// Name shown in diagrams and configuration errors
        name: String,
        condition: Condition,
        target: NodeId,
    },
}

impl Edge {
    pub fn target(&self) -> &str {
        match self {
            Edge::Direct(target) => target,
            Edge::Conditional { target, .. } => target,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Edge::Conditional { .. })
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(target) => f.debug_tuple("Direct").field(target).finish(),
            Edge::Conditional { name, target, .. } => f
                .debug_struct("Conditional")
                .field("name", name)
                .field("condition", &"<function>")
                .field("target", target)
                .finish(),
        }
    }
}

/// Graph structure
///
/// Nodes keep their insertion order for inspection and diagrams.
#[derive(Clone, Default)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, Arc<dyn Node>>,
    pub(crate) order: Vec<NodeId>,
    pub(crate) edges: HashMap<NodeId, Vec<Edge>>,
    pub(crate) entry: Option<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate graph structure
    pub fn validate(&self) -> Result<()> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| GraphError::Validation("No entry node set".to_string()))?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::Validation(format!(
                "Entry point {} does not exist",
                entry
            )));
        }

        for name in &self.order {
            if name == START || name == END {
                return Err(GraphError::Validation(format!(
                    "Node name {} is reserved",
                    name
                )));
            }
        }

        for (from, edges) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "Edge source {} does not exist",
                    from
                )));
            }

            for edge in edges {
                let to = edge.target();
                if !self.nodes.contains_key(to) && to != END {
                    return Err(GraphError::Validation(format!(
                        "Edge target {} does not exist",
                        to
                    )));
                }
            }

            let direct = edges.iter().filter(|e| !e.is_conditional()).count();
            if direct > 1 {
                return Err(GraphError::Validation(format!(
                    "Node {} has {} direct edges; use conditional edges to branch",
                    from, direct
                )));
            }
            if direct == 1 && edges.len() > 1 {
                return Err(GraphError::Validation(format!(
                    "Node {} mixes direct and conditional edges",
                    from
                )));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.order)
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

/// Validated, immutable graph bound to a state schema
#[derive(Clone, Debug)]
pub struct CompiledGraph {
    graph: Arc<Graph>,
    schema: Arc<StateSchema>,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph, schema: StateSchema) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            graph: Arc::new(graph),
            schema: Arc::new(schema),
        })
    }

    /// Entry node name
    pub fn entry(&self) -> &str {
        // validate() guarantees the entry is set
        self.graph.entry.as_deref().unwrap_or(END)
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    pub fn node(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.graph.nodes.get(name).cloned()
    }

    /// Node names in insertion order
    pub fn node_names(&self) -> Vec<&str> {
        self.graph.order.iter().map(String::as_str).collect()
    }

    /// Possible targets of a node's outgoing edges (`END` included)
    pub fn successors(&self, name: &str) -> Vec<&str> {
        match self.graph.edges.get(name) {
            Some(edges) if !edges.is_empty() => edges.iter().map(Edge::target).collect(),
            _ => vec![END],
        }
    }

    /// Pick the node that follows `from`; `None` ends the walk
    pub fn route(&self, from: &str, state: &StateRecord) -> Result<Option<NodeId>> {
        let edges = match self.graph.edges.get(from) {
            Some(edges) if !edges.is_empty() => edges,
            _ => return Ok(None),
        };

        let target = match edges.as_slice() {
            [Edge::Direct(target)] => target.clone(),
            _ => {
                let matched: Vec<&Edge> = edges
                    .iter()
                    .filter(|edge| match edge {
                        Edge::Conditional { condition, .. } => condition(state),
                        Edge::Direct(_) => false,
                    })
                    .collect();

                match matched.as_slice() {
                    [edge] => edge.target().to_string(),
                    [] => {
                        return Err(GraphError::Configuration(format!(
                            "no conditional edge out of '{}' matched",
                            from
                        )))
                    }
                    several => {
                        let names: Vec<String> = several
                            .iter()
                            .map(|edge| match edge {
                                Edge::Conditional { name, .. } => name.clone(),
                                Edge::Direct(target) => target.clone(),
                            })
                            .collect();
                        return Err(GraphError::Configuration(format!(
                            "{} conditional edges out of '{}' matched: {}",
                            several.len(),
                            from,
                            names.join(", ")
                        )));
                    }
                }
            }
        };

        tracing::debug!(from, to = %target, "routed");
        Ok(if target == END { None } else { Some(target) })
    }

    /// Render the graph as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut output = String::from("graph TD\n");
        output.push_str(&format!("    {}((start))\n", START));
        output.push_str(&format!("    {}((end))\n", END));
        output.push_str(&format!("    {} --> {}\n", START, self.entry()));

        for name in &self.graph.order {
            match self.graph.edges.get(name) {
                Some(edges) if !edges.is_empty() => {
                    for edge in edges {
                        match edge {
                            Edge::Direct(target) => {
                                output.push_str(&format!("    {} --> {}\n", name, target))
                            }
                            Edge::Conditional { name: label, target, .. } => output.push_str(
                                &format!("    {} -->|{}| {}\n", name, label, target),
                            ),
                        }
                    }
                }
                _ => output.push_str(&format!("    {} --> {}\n", name, END)),
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateGraph;
    use crate::error::GraphError;
    use crate::node::NodeOutcome;
    use crate::state::FieldKind;
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::from_fields([("score", FieldKind::Overwrite)]).unwrap()
    }

    fn noop() -> impl Node {
        crate::node::FnNode::new(|_, _| async { Ok::<_, GraphError>(NodeOutcome::unchanged()) })
    }

    fn branching(high: f64, low: f64) -> CompiledGraph {
        let mut graph = StateGraph::new();
        graph
            .add_node("score", noop())
            .add_node("escalate", noop())
            .add_node("accept", noop())
            .add_conditional_edge("score", "high", "escalate", move |s: &StateRecord| {
                s.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) >= high
            })
            .add_conditional_edge("score", "low", "accept", move |s: &StateRecord| {
                s.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) < low
            })
            .set_entry("score");
        graph.compile(schema()).unwrap()
    }

    fn state(score: i64) -> StateRecord {
        StateRecord::from_input(Arc::new(schema()), json!({ "score": score })).unwrap()
    }

    #[test]
    fn test_route_picks_single_match() {
        let graph = branching(70.0, 70.0);
        assert_eq!(graph.route("score", &state(80)).unwrap().as_deref(), Some("escalate"));
        assert_eq!(graph.route("score", &state(10)).unwrap().as_deref(), Some("accept"));
        assert_eq!(graph.route("accept", &state(10)).unwrap(), None);
    }

    #[test]
    fn test_route_rejects_no_match() {
        // 50 is neither >= 70 nor < 30
        let graph = branching(70.0, 30.0);
        let err = graph.route("score", &state(50)).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[test]
    fn test_route_rejects_ambiguous_match() {
        // 50 is both >= 40 and < 60
        let graph = branching(40.0, 60.0);
        let err = graph.route("score", &state(50)).unwrap_err();
        match err {
            GraphError::Configuration(msg) => assert!(msg.contains("high, low")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_successors_and_names() {
        let graph = branching(70.0, 70.0);
        assert_eq!(graph.node_names(), vec!["score", "escalate", "accept"]);
        assert_eq!(graph.successors("score"), vec!["escalate", "accept"]);
        assert_eq!(graph.successors("accept"), vec![END]);
    }

    #[test]
    fn test_mermaid_output() {
        let mermaid = branching(70.0, 70.0).to_mermaid();
        assert!(mermaid.starts_with("graph TD\n"));
        assert!(mermaid.contains("__start__ --> score"));
        assert!(mermaid.contains("score -->|high| escalate"));
        assert!(mermaid.contains("accept --> __end__"));
    }
}
