//! Negotiation service on top of the executor
//!
//! [`NegotiationWorkflow`] is what a transport layer (CLI, HTTP handler,
//! queue consumer) talks to. It owns the compiled graph and the checkpoint
//! saver; each negotiation is one thread id.
//!
//! ```rust
//! use gategraph_checkpoint::InMemoryCheckpointSaver;
//! use negotiator::{
//!     ApprovalDecision, Collaborators, NegotiationRequest, NegotiationWorkflow, WorkflowOptions,
//!     WorkflowResponse,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = NegotiationWorkflow::new(
//!     Collaborators::mock(),
//!     Arc::new(InMemoryCheckpointSaver::new()),
//!     WorkflowOptions::default(),
//! )?;
//!
//! let paused = workflow
//!     .start(NegotiationRequest::new("ACME-1", "Net 90 payment terms").with_thread_id("deal-7"))
//!     .await?;
//! assert!(matches!(paused, WorkflowResponse::Paused { .. }));
//!
//! let done = workflow.resume("deal-7", ApprovalDecision::approve()).await?;
//! assert!(matches!(done, WorkflowResponse::Completed { .. }));
//! # Ok(())
//! # }
//! ```

use crate::compliance::{ComplianceEvaluator, EvaluationResult, Policy};
use crate::generation::TextGenerator;
use crate::mock::{MockRiskIntelligence, MockTextGenerator, StaticComplianceEvaluator};
use crate::nodes::{
    ApprovalDecision, ComplianceCheckNode, DecisionSynthesisNode, DraftingNode, HumanGateNode,
    ReviewTrigger, RiskCheckNode, COMPLIANCE_CHECK, DECISION_SYNTHESIS, DRAFTING, HUMAN_GATE,
    RISK_CHECK,
};
use crate::risk::RiskIntelligence;
use crate::state::{
    negotiation_schema, AgencyLevel, ApprovalStatus, Message, StrategyDecision, AGENCY_LEVEL,
    APPROVAL_STATUS, CLAUSE_TEXT, CONTRACT_ID, HUMAN_FEEDBACK, MESSAGES, POLICY_ANALYSIS,
    PROPOSED_REDLINE, REASONING, STRATEGY_DECISION, SUPPLIER_ID,
};
use futures::TryStreamExt;
use gategraph_checkpoint::{CheckpointSaver, CheckpointTuple};
use gategraph_core::{
    CompiledGraph, Executor, Result, RunOutcome, StateGraph, StateRecord, StateSnapshot,
    DEFAULT_MAX_STEPS,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// External services the nodes depend on
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub compliance: Arc<dyn ComplianceEvaluator>,
    pub risk: Arc<dyn RiskIntelligence>,
}

impl Collaborators {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        compliance: Arc<dyn ComplianceEvaluator>,
        risk: Arc<dyn RiskIntelligence>,
    ) -> Self {
        Self {
            generator,
            compliance,
            risk,
        }
    }

    /// Offline collaborators: canned COUNTER strategy, compliant verdicts
    pub fn mock() -> Self {
        Self::new(
            Arc::new(MockTextGenerator::new()),
            Arc::new(StaticComplianceEvaluator::compliant()),
            Arc::new(MockRiskIntelligence::new()),
        )
    }
}

/// Knobs that shape the compiled graph
#[derive(Clone)]
pub struct WorkflowOptions {
    /// Used when a request does not name its own level
    pub agency_level: AgencyLevel,
    pub policy: Option<Policy>,
    /// Consulted by the human gate for `AUTONOMOUS` threads
    pub review_trigger: Option<ReviewTrigger>,
    pub max_steps: u32,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            agency_level: AgencyLevel::default(),
            policy: None,
            review_trigger: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Input of [`NegotiationWorkflow::start`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    /// Generated when absent
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub contract_id: Option<String>,
    pub supplier_id: String,
    pub clause: String,
    #[serde(default)]
    pub agency_level: Option<AgencyLevel>,
}

impl NegotiationRequest {
    pub fn new(supplier_id: impl Into<String>, clause: impl Into<String>) -> Self {
        Self {
            thread_id: None,
            contract_id: None,
            supplier_id: supplier_id.into(),
            clause: clause.into(),
            agency_level: None,
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_contract_id(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
        self
    }

    pub fn with_agency_level(mut self, level: AgencyLevel) -> Self {
        self.agency_level = Some(level);
        self
    }

    fn into_input(self, default_level: AgencyLevel) -> Value {
        let mut input = Map::new();
        if let Some(contract_id) = self.contract_id {
            input.insert(CONTRACT_ID.to_string(), Value::String(contract_id));
        }
        input.insert(SUPPLIER_ID.to_string(), Value::String(self.supplier_id));
        input.insert(CLAUSE_TEXT.to_string(), Value::String(self.clause));
        let level = self.agency_level.unwrap_or(default_level);
        input.insert(
            AGENCY_LEVEL.to_string(),
            Value::String(level.as_str().to_string()),
        );
        Value::Object(input)
    }
}

/// Caller-facing result of `start` and `resume`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowResponse {
    Completed {
        thread_id: String,
        strategy: Option<StrategyDecision>,
        reasoning: Option<String>,
        redline: Option<String>,
        approval_status: Option<ApprovalStatus>,
        feedback: Option<String>,
        compliance_status: Option<String>,
        messages: Vec<Message>,
    },
    Paused {
        thread_id: String,
        node: String,
        interrupt_id: String,
        interrupt: Value,
    },
}

impl WorkflowResponse {
    pub fn thread_id(&self) -> &str {
        match self {
            WorkflowResponse::Completed { thread_id, .. }
            | WorkflowResponse::Paused { thread_id, .. } => thread_id,
        }
    }

    fn from_outcome(outcome: RunOutcome) -> Result<Self> {
        match outcome {
            RunOutcome::Paused {
                thread_id,
                node,
                interrupt_id,
                payload,
                ..
            } => Ok(WorkflowResponse::Paused {
                thread_id,
                node,
                interrupt_id,
                interrupt: payload,
            }),
            RunOutcome::Completed {
                thread_id, state, ..
            } => Self::completed(thread_id, &state),
        }
    }

    fn completed(thread_id: String, state: &StateRecord) -> Result<Self> {
        let compliance = state.get_as::<EvaluationResult>(POLICY_ANALYSIS)?;
        Ok(WorkflowResponse::Completed {
            thread_id,
            strategy: state.get_as(STRATEGY_DECISION)?,
            reasoning: state.get_as(REASONING)?,
            redline: state.get_as::<Option<String>>(PROPOSED_REDLINE)?.flatten(),
            approval_status: state.get_as(APPROVAL_STATUS)?,
            feedback: state.get_as::<Option<String>>(HUMAN_FEEDBACK)?.flatten(),
            compliance_status: compliance.map(|c| c.status.as_str().to_string()),
            messages: state.get_as(MESSAGES)?.unwrap_or_default(),
        })
    }
}

/// Start, resume and inspect negotiations
#[derive(Clone)]
pub struct NegotiationWorkflow {
    executor: Executor,
    default_level: AgencyLevel,
}

impl NegotiationWorkflow {
    pub fn new(
        collaborators: Collaborators,
        saver: Arc<dyn CheckpointSaver>,
        options: WorkflowOptions,
    ) -> Result<Self> {
        let graph = build_graph(&collaborators, &options)?;
        let executor = Executor::new(graph, saver).with_max_steps(options.max_steps);
        Ok(Self {
            executor,
            default_level: options.agency_level,
        })
    }

    pub fn graph(&self) -> &CompiledGraph {
        self.executor.graph()
    }

    /// Run a new negotiation until it completes or reaches the human gate
    #[tracing::instrument(skip_all, fields(supplier_id = %request.supplier_id))]
    pub async fn start(&self, request: NegotiationRequest) -> Result<WorkflowResponse> {
        let thread_id = request
            .thread_id
            .clone()
            .unwrap_or_else(|| format!("negotiation-{}", uuid::Uuid::new_v4()));
        tracing::info!(thread_id = %thread_id, "starting negotiation");

        let input = request.into_input(self.default_level);
        let outcome = self.executor.run(&thread_id, input).await?;
        WorkflowResponse::from_outcome(outcome)
    }

    /// Answer the human gate of a paused negotiation
    pub async fn resume(
        &self,
        thread_id: &str,
        decision: ApprovalDecision,
    ) -> Result<WorkflowResponse> {
        tracing::info!(thread_id, status = decision.status.as_str(), "resuming negotiation");
        let outcome = self
            .executor
            .resume(thread_id, serde_json::to_value(decision)?)
            .await?;
        WorkflowResponse::from_outcome(outcome)
    }

    /// Resume with an arbitrary value, as received from an untyped transport
    pub async fn resume_raw(&self, thread_id: &str, value: Value) -> Result<WorkflowResponse> {
        let outcome = self.executor.resume(thread_id, value).await?;
        WorkflowResponse::from_outcome(outcome)
    }

    /// Latest checkpoint of a negotiation, `None` for an unknown thread
    pub async fn inspect(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        self.executor.inspect(thread_id).await
    }

    /// Stored checkpoints of a negotiation, newest first
    pub async fn history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>> {
        let stream = self.executor.saver().list(thread_id, limit).await?;
        Ok(stream.try_collect::<Vec<_>>().await?)
    }
}

/// Wire the five nodes into the negotiation graph
pub fn build_graph(collaborators: &Collaborators, options: &WorkflowOptions) -> Result<CompiledGraph> {
    let mut gate = HumanGateNode::new(options.agency_level);
    if let Some(trigger) = &options.review_trigger {
        gate = gate.with_review_trigger(trigger.clone());
    }

    let mut graph = StateGraph::new();
    graph
        .add_node(
            COMPLIANCE_CHECK,
            ComplianceCheckNode::new(collaborators.compliance.clone(), options.policy.clone()),
        )
        .add_node(RISK_CHECK, RiskCheckNode::new(collaborators.risk.clone()))
        .add_node(
            DECISION_SYNTHESIS,
            DecisionSynthesisNode::new(collaborators.generator.clone()),
        )
        .add_node(HUMAN_GATE, gate)
        .add_node(DRAFTING, DraftingNode::new(collaborators.generator.clone()))
        .set_entry(COMPLIANCE_CHECK)
        .add_edge(COMPLIANCE_CHECK, RISK_CHECK)
        .add_edge(RISK_CHECK, DECISION_SYNTHESIS)
        .add_edge(DECISION_SYNTHESIS, HUMAN_GATE)
        .add_edge(HUMAN_GATE, DRAFTING)
        .add_finish(DRAFTING);

    graph.compile(negotiation_schema()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_graph_order() {
        let graph = build_graph(&Collaborators::mock(), &WorkflowOptions::default()).unwrap();
        assert_eq!(graph.entry(), COMPLIANCE_CHECK);
        assert_eq!(graph.successors(COMPLIANCE_CHECK), vec![RISK_CHECK]);
        assert_eq!(graph.successors(DECISION_SYNTHESIS), vec![HUMAN_GATE]);
        assert_eq!(graph.successors(HUMAN_GATE), vec![DRAFTING]);
        assert!(graph.to_mermaid().contains("human-gate --> drafting"));
    }

    #[test]
    fn test_request_input_uses_default_level() {
        let input = NegotiationRequest::new("ACME-1", "Net 90")
            .with_contract_id("C-1")
            .into_input(AgencyLevel::Strict);
        assert_eq!(
            input,
            json!({
                "contract_id": "C-1",
                "supplier_id": "ACME-1",
                "current_clause_text": "Net 90",
                "agency_level": "STRICT"
            })
        );
    }

    #[test]
    fn test_paused_response_shape() {
        let response = WorkflowResponse::Paused {
            thread_id: "t".to_string(),
            node: HUMAN_GATE.to_string(),
            interrupt_id: "i".to_string(),
            interrupt: json!({"type": "approval_required"}),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "paused");
        assert_eq!(value["interrupt"]["type"], "approval_required");
    }

    #[test]
    fn test_corrupt_policy_analysis_is_an_error() {
        let schema = Arc::new(negotiation_schema().unwrap());
        let state = StateRecord::from_input(
            schema,
            json!({"supplier_id": "ACME-1", "policy_analysis": "garbled"}),
        )
        .unwrap();

        let err = WorkflowResponse::completed("t".to_string(), &state).unwrap_err();
        assert!(matches!(err, gategraph_core::GraphError::State(_)));
    }
}
