//! The five negotiation nodes
//!
//! ```text
//! compliance-check -> risk-check -> decision-synthesis -> human-gate -> drafting
//! ```
//!
//! Each node owns the collaborators it needs; nothing is looked up from
//! globals while the graph runs. Only [`HumanGateNode`] suspends, and
//! everything it does before suspending is a read of the state record, so
//! re-entering it on resume is harmless.

use crate::compliance::{ComplianceEvaluator, EvaluationResult, Policy};
use crate::generation::TextGenerator;
use crate::risk::RiskIntelligence;
use crate::state::{
    AgencyLevel, ApprovalStatus, Message, StrategyDecision, AGENCY_LEVEL, APPROVAL_STATUS,
    CLAUSE_TEXT, HUMAN_FEEDBACK, MESSAGES, POLICY_ANALYSIS, PROPOSED_REDLINE, REASONING,
    RISK_PROFILE, STRATEGY_DECISION, SUPPLIER_ID,
};
use async_trait::async_trait;
use gategraph_core::{GraphError, Node, NodeContext, NodeOutcome, Result, StateRecord, StateUpdate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const COMPLIANCE_CHECK: &str = "compliance-check";
pub const RISK_CHECK: &str = "risk-check";
pub const DECISION_SYNTHESIS: &str = "decision-synthesis";
pub const HUMAN_GATE: &str = "human-gate";
pub const DRAFTING: &str = "drafting";

/// `type` of the payload surfaced by [`HumanGateNode`]
pub const APPROVAL_REQUIRED: &str = "approval_required";

const NEGOTIATOR_PROMPT: &str = "You are the Chief Negotiator. Your goal is to decide whether to ACCEPT, REJECT, or COUNTER a contract clause based on Policy Compliance and Supplier Risk.\n\
RULES:\n\
1. If Policy Status is NON_COMPLIANT, you MUST REJECT or COUNTER.\n\
2. If Risk is HIGH (Score > 70), be more aggressive/protective.\n\
3. Output JSON: { \"decision\": \"...\", \"reasoning\": \"...\" }\n\
Valid Decisions: ACCEPT, REJECT, COUNTER";

const DRAFTER_PROMPT: &str =
    "You are an expert Legal Drafter. Rewrite the clause to address the issues.";

/// Decides whether an autonomous thread still needs a human
pub type ReviewTrigger = Arc<dyn Fn(&StateRecord) -> bool + Send + Sync>;

/// Trigger that fires when the clause mentions any of `keywords`
///
/// Matching is case-insensitive. An empty list never fires.
pub fn keyword_review_trigger<I, S>(keywords: I) -> ReviewTrigger
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.as_ref().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    Arc::new(move |state: &StateRecord| {
        let clause = state.get_str(CLAUSE_TEXT).unwrap_or_default().to_lowercase();
        keywords.iter().any(|k| clause.contains(k.as_str()))
    })
}

/// Value a reviewer supplies to resume the human gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            status: ApprovalStatus::Approved,
            feedback: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            status: ApprovalStatus::Rejected,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct StrategyReply {
    decision: StrategyDecision,
    reasoning: String,
}

fn strategy_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decision": {"type": "string", "enum": ["ACCEPT", "REJECT", "COUNTER"]},
            "reasoning": {"type": "string"}
        },
        "required": ["decision", "reasoning"]
    })
}

fn required_str<'a>(state: &'a StateRecord, field: &str, ctx: &NodeContext) -> Result<&'a str> {
    state
        .get_str(field)
        .ok_or_else(|| GraphError::node_execution(ctx.node(), format!("{} is not set", field)))
}

fn field_or_null(state: &StateRecord, field: &str) -> Value {
    state.get(field).cloned().unwrap_or(Value::Null)
}

/// Checks the clause against the configured policy
pub struct ComplianceCheckNode {
    evaluator: Arc<dyn ComplianceEvaluator>,
    policy: Option<Policy>,
}

impl ComplianceCheckNode {
    pub fn new(evaluator: Arc<dyn ComplianceEvaluator>, policy: Option<Policy>) -> Self {
        Self { evaluator, policy }
    }
}

#[async_trait]
impl Node for ComplianceCheckNode {
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        let clause = required_str(&state, CLAUSE_TEXT, &ctx)?;

        let result = match self.policy.as_ref().filter(|p| p.is_active) {
            Some(policy) => self.evaluator.evaluate(clause, policy).await,
            None => {
                tracing::info!("no active policy, compliance check skipped");
                EvaluationResult::skipped()
            }
        };

        tracing::info!(status = result.status.as_str(), "compliance check finished");
        Ok(StateUpdate::new()
            .set(POLICY_ANALYSIS, serde_json::to_value(result)?)
            .into())
    }
}

/// Refreshes the supplier's risk profile
pub struct RiskCheckNode {
    intelligence: Arc<dyn RiskIntelligence>,
}

impl RiskCheckNode {
    pub fn new(intelligence: Arc<dyn RiskIntelligence>) -> Self {
        Self { intelligence }
    }
}

#[async_trait]
impl Node for RiskCheckNode {
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        let Some(supplier_id) = state.get_str(SUPPLIER_ID) else {
            tracing::warn!("no supplier on the thread, risk profile left absent");
            return Ok(NodeOutcome::unchanged());
        };

        let profile = self
            .intelligence
            .refresh_profile(supplier_id)
            .await
            .map_err(|e| GraphError::node_execution(ctx.node(), e))?;

        tracing::info!(
            supplier_id,
            risk_score = profile.risk_score,
            sanctions = profile.sanctions_flag,
            "risk profile refreshed"
        );
        Ok(StateUpdate::new()
            .set(RISK_PROFILE, serde_json::to_value(profile)?)
            .into())
    }
}

/// Chooses ACCEPT, REJECT or COUNTER from the compliance and risk findings
pub struct DecisionSynthesisNode {
    generator: Arc<dyn TextGenerator>,
}

impl DecisionSynthesisNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node for DecisionSynthesisNode {
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        let clause = required_str(&state, CLAUSE_TEXT, &ctx)?;
        let content = format!(
            "CLAUSE: {}\nPOLICY REPORT: {}\nSUPPLIER RISK: {}\n",
            clause,
            field_or_null(&state, POLICY_ANALYSIS),
            field_or_null(&state, RISK_PROFILE),
        );

        let reply = self
            .generator
            .generate_structured(
                &[Message::user(content)],
                &strategy_schema(),
                Some(NEGOTIATOR_PROMPT),
            )
            .await?;
        let strategy: StrategyReply = serde_json::from_value(reply)
            .map_err(|e| GraphError::Generation(format!("undecodable strategy: {}", e)))?;

        tracing::info!(decision = strategy.decision.as_str(), "strategy chosen");
        Ok(StateUpdate::new()
            .set(STRATEGY_DECISION, strategy.decision.as_str())
            .set(REASONING, strategy.reasoning)
            .into())
    }
}

/// Pauses for a human according to the thread's agency level
///
/// `STRICT` and `MEDIUM` always ask. `AUTONOMOUS` asks only when the review
/// trigger fires and otherwise records `AUTO_APPROVED`. The resume value must
/// decode as an [`ApprovalDecision`] with status `APPROVED` or `REJECTED`.
pub struct HumanGateNode {
    default_level: AgencyLevel,
    review_trigger: Option<ReviewTrigger>,
}

impl HumanGateNode {
    pub fn new(default_level: AgencyLevel) -> Self {
        Self {
            default_level,
            review_trigger: None,
        }
    }

    pub fn with_review_trigger(mut self, trigger: ReviewTrigger) -> Self {
        self.review_trigger = Some(trigger);
        self
    }

    fn needs_review(&self, level: AgencyLevel, state: &StateRecord) -> bool {
        match level {
            AgencyLevel::Strict | AgencyLevel::Medium => true,
            AgencyLevel::Autonomous => self
                .review_trigger
                .as_ref()
                .is_some_and(|trigger| trigger(state)),
        }
    }
}

#[async_trait]
impl Node for HumanGateNode {
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        let level = state
            .get_as::<AgencyLevel>(AGENCY_LEVEL)?
            .unwrap_or(self.default_level);

        // a paused thread always takes the reviewer's answer, whatever the
        // trigger of the resuming process says
        if !ctx.is_resuming() && !self.needs_review(level, &state) {
            tracing::info!(agency_level = %level, "strategy auto-approved");
            return Ok(StateUpdate::new()
                .set(APPROVAL_STATUS, ApprovalStatus::AutoApproved.as_str())
                .into());
        }

        let payload = json!({
            "type": APPROVAL_REQUIRED,
            "current_context": field_or_null(&state, REASONING),
            "strategy": field_or_null(&state, STRATEGY_DECISION),
            "agency_level": level,
        });
        let answer = match ctx.suspend(payload) {
            Ok(answer) => answer,
            Err(suspension) => {
                tracing::info!(agency_level = %level, "waiting for human approval");
                return Ok(suspension.into());
            }
        };

        let decision: ApprovalDecision = serde_json::from_value(answer).map_err(|e| {
            GraphError::node_execution(ctx.node(), format!("unrecognised approval: {}", e))
        })?;
        if decision.status == ApprovalStatus::AutoApproved {
            return Err(GraphError::node_execution(
                ctx.node(),
                "a reviewer may only answer APPROVED or REJECTED",
            ));
        }

        tracing::info!(status = decision.status.as_str(), "human decision recorded");
        Ok(StateUpdate::new()
            .set(APPROVAL_STATUS, decision.status.as_str())
            .set(HUMAN_FEEDBACK, decision.feedback)
            .into())
    }
}

/// Writes the redline, or explains why there is none
pub struct DraftingNode {
    generator: Arc<dyn TextGenerator>,
}

impl DraftingNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node for DraftingNode {
    async fn execute(&self, state: StateRecord, ctx: NodeContext) -> Result<NodeOutcome> {
        let approval = state.get_as::<ApprovalStatus>(APPROVAL_STATUS)?;
        if approval == Some(ApprovalStatus::Rejected) {
            tracing::info!("strategy rejected, nothing drafted");
            return Ok(StateUpdate::new()
                .set(PROPOSED_REDLINE, Value::Null)
                .append_one(
                    MESSAGES,
                    serde_json::to_value(Message::agent(
                        "Process halted: Strategy rejected by user.",
                    ))?,
                )
                .into());
        }

        let decision = state.get_as::<StrategyDecision>(STRATEGY_DECISION)?;
        let reasoning = state.get_str(REASONING).unwrap_or_default();

        let decision = match decision {
            Some(decision) if decision.needs_redline() => decision,
            other => {
                let label = other.map(|d| d.as_str()).unwrap_or("UNDECIDED");
                return Ok(StateUpdate::new()
                    .set(PROPOSED_REDLINE, Value::Null)
                    .append_one(
                        MESSAGES,
                        serde_json::to_value(Message::agent(format!(
                            "Result: {}\nReasoning: {}",
                            label, reasoning
                        )))?,
                    )
                    .into());
            }
        };

        let clause = required_str(&state, CLAUSE_TEXT, &ctx)?;
        let request = format!(
            "ORIGINAL: {}\nISSUE: {}\nTASK: Write the new legal text.",
            clause, reasoning
        );
        let redline = self
            .generator
            .generate_text(&[Message::user(request)], Some(DRAFTER_PROMPT))
            .await?;

        tracing::info!(decision = decision.as_str(), "redline drafted");
        let summary = format!(
            "Proposed Redline ({}):\n{}\n\nReasoning: {}",
            decision, redline, reasoning
        );
        Ok(StateUpdate::new()
            .set(PROPOSED_REDLINE, redline)
            .append_one(MESSAGES, serde_json::to_value(Message::agent(summary))?)
            .into())
    }
}
