//! # negotiator - Contract Negotiation with Human Approval
//!
//! A gategraph workflow that reviews one contract clause at a time:
//!
//! 1. **compliance-check** - evaluate the clause against the corporate policy
//! 2. **risk-check** - refresh the supplier's risk profile
//! 3. **decision-synthesis** - choose `ACCEPT`, `REJECT` or `COUNTER`
//! 4. **human-gate** - pause for approval, depending on the agency level
//! 5. **drafting** - write the redline, or explain why there is none
//!
//! The language model, the compliance evaluator and the risk source are
//! traits ([`TextGenerator`], [`ComplianceEvaluator`], [`RiskIntelligence`])
//! handed to the workflow through [`Collaborators`]. The [`mock`] module has
//! deterministic implementations for demos and tests.
//!
//! Negotiations are checkpointed after every node, so a paused negotiation
//! can be approved from another process once the reviewer gets to it. See
//! [`NegotiationWorkflow`] for the service API and the `negotiator` binary
//! for a command line front end.

pub mod compliance;
pub mod config;
pub mod generation;
pub mod mock;
pub mod nodes;
pub mod risk;
pub mod state;
pub mod workflow;

pub use compliance::{
    ComplianceEvaluator, ComplianceStatus, EvaluationResult, LlmComplianceEvaluator, Policy,
};
pub use config::{ConfigError, NegotiatorConfig};
pub use generation::{GenerationError, SchemaCheckedGenerator, TextGenerator};
pub use nodes::{keyword_review_trigger, ApprovalDecision, ReviewTrigger};
pub use risk::{IntelligenceError, RiskIntelligence, RiskProfile};
pub use state::{AgencyLevel, ApprovalStatus, Message, StrategyDecision};
pub use workflow::{
    build_graph, Collaborators, NegotiationRequest, NegotiationWorkflow, WorkflowOptions,
    WorkflowResponse,
};
