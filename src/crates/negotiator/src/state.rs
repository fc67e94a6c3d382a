//! Negotiation state record
//!
//! Field names and the typed values stored in them. Every field is an
//! overwrite field except [`MESSAGES`], which accumulates the agent's
//! transcript across the whole life of a thread.

use gategraph_core::{FieldKind, StateError, StateSchema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CONTRACT_ID: &str = "contract_id";
pub const SUPPLIER_ID: &str = "supplier_id";
pub const CLAUSE_TEXT: &str = "current_clause_text";
pub const POLICY_ANALYSIS: &str = "policy_analysis";
pub const RISK_PROFILE: &str = "risk_profile";
pub const MESSAGES: &str = "messages";
pub const STRATEGY_DECISION: &str = "strategy_decision";
pub const PROPOSED_REDLINE: &str = "proposed_redline";
pub const REASONING: &str = "reasoning";
pub const AGENCY_LEVEL: &str = "agency_level";
pub const APPROVAL_STATUS: &str = "human_approval_status";
pub const HUMAN_FEEDBACK: &str = "human_feedback";

/// Schema of the negotiation state record
pub fn negotiation_schema() -> Result<StateSchema, StateError> {
    StateSchema::from_fields([
        (CONTRACT_ID, FieldKind::Overwrite),
        (SUPPLIER_ID, FieldKind::Overwrite),
        (CLAUSE_TEXT, FieldKind::Overwrite),
        (POLICY_ANALYSIS, FieldKind::Overwrite),
        (RISK_PROFILE, FieldKind::Overwrite),
        (MESSAGES, FieldKind::Append),
        (STRATEGY_DECISION, FieldKind::Overwrite),
        (PROPOSED_REDLINE, FieldKind::Overwrite),
        (REASONING, FieldKind::Overwrite),
        (AGENCY_LEVEL, FieldKind::Overwrite),
        (APPROVAL_STATUS, FieldKind::Overwrite),
        (HUMAN_FEEDBACK, FieldKind::Overwrite),
    ])
}

/// How much the agent may do without a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgencyLevel {
    /// Every strategy waits for approval
    Strict,
    /// Every strategy waits for approval
    #[default]
    Medium,
    /// Proceeds alone unless the review trigger fires
    Autonomous,
}

impl AgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyLevel::Strict => "STRICT",
            AgencyLevel::Medium => "MEDIUM",
            AgencyLevel::Autonomous => "AUTONOMOUS",
        }
    }
}

impl fmt::Display for AgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRICT" => Ok(AgencyLevel::Strict),
            "MEDIUM" => Ok(AgencyLevel::Medium),
            "AUTONOMOUS" => Ok(AgencyLevel::Autonomous),
            other => Err(format!(
                "unknown agency level '{}' (expected STRICT, MEDIUM or AUTONOMOUS)",
                other
            )),
        }
    }
}

/// Strategy chosen for a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyDecision {
    Accept,
    Reject,
    Counter,
}

impl StrategyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyDecision::Accept => "ACCEPT",
            StrategyDecision::Reject => "REJECT",
            StrategyDecision::Counter => "COUNTER",
        }
    }

    /// Whether the drafter writes replacement text for this decision
    pub fn needs_redline(&self) -> bool {
        matches!(self, StrategyDecision::Counter | StrategyDecision::Reject)
    }
}

impl fmt::Display for StrategyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the human gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    AutoApproved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
            ApprovalStatus::AutoApproved => "AUTO_APPROVED",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the transcript held in [`MESSAGES`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new("agent", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_messages_as_append() {
        let schema = negotiation_schema().unwrap();
        assert_eq!(schema.len(), 12);
        assert_eq!(schema.kind(MESSAGES), Some(FieldKind::Append));
        assert_eq!(schema.kind(CLAUSE_TEXT), Some(FieldKind::Overwrite));
    }

    #[test]
    fn test_agency_level_parse() {
        assert_eq!("autonomous".parse::<AgencyLevel>().unwrap(), AgencyLevel::Autonomous);
        assert_eq!("STRICT".parse::<AgencyLevel>().unwrap(), AgencyLevel::Strict);
        assert!("reckless".parse::<AgencyLevel>().is_err());
        assert_eq!(AgencyLevel::default(), AgencyLevel::Medium);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_value(ApprovalStatus::AutoApproved).unwrap(),
            serde_json::json!("AUTO_APPROVED")
        );
        assert_eq!(
            serde_json::from_value::<StrategyDecision>(serde_json::json!("COUNTER")).unwrap(),
            StrategyDecision::Counter
        );
        assert!(StrategyDecision::Reject.needs_redline());
        assert!(!StrategyDecision::Accept.needs_redline());
    }
}
