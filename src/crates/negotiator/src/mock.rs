//! Offline collaborators for demos and tests
//!
//! The mocks are deterministic. [`MockRiskIntelligence`] derives its data
//! from triggers in the supplier record:
//!
//! | Trigger | Effect |
//! |---------|--------|
//! | DUNS starting with `999` | financial stress 25, credit `CC` |
//! | name containing `Risky` or `Volatile` | two negative headlines |
//! | name containing `Green` | two positive headlines |
//! | name containing `Sanctioned`, country `KP`/`RU`/`IR` | OFAC SDN match |

use crate::compliance::{ComplianceEvaluator, ComplianceStatus, EvaluationResult, Policy};
use crate::generation::{GenerationError, TextGenerator};
use crate::risk::{
    combined_risk_score, IntelligenceError, RecommendedAction, RiskIntelligence, RiskProfile,
    HIGH_RISK_THRESHOLD,
};
use crate::state::Message;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const MOCK_TEXT_REPLY: &str = "This is a mock response from the AI Agent. Please configure a real LLM Provider for dynamic content.";

const MOCK_REASONING: &str =
    "This is a mock analysis. The clause was flagged for review requiring a counter-proposal.";

/// A request seen by [`MockTextGenerator`]
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    pub structured: bool,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
}

/// Canned replies, selected for structured calls by schema property name
pub struct MockTextGenerator {
    text_reply: String,
    structured_replies: Vec<(String, Value)>,
    failure: Option<GenerationError>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self {
            text_reply: MOCK_TEXT_REPLY.to_string(),
            structured_replies: vec![(
                "decision".to_string(),
                json!({"decision": "COUNTER", "reasoning": MOCK_REASONING}),
            )],
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply returned by `generate_text`
    pub fn with_text(mut self, reply: impl Into<String>) -> Self {
        self.text_reply = reply.into();
        self
    }

    /// Reply returned for any schema declaring the property `key`
    ///
    /// Later registrations for the same key take precedence.
    pub fn with_structured(mut self, key: impl Into<String>, reply: Value) -> Self {
        self.structured_replies.insert(0, (key.into(), reply));
        self
    }

    /// Fail every call with `error`
    pub fn failing(mut self, error: GenerationError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Every request received so far, oldest first
    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().clone()
    }

    fn record(&self, structured: bool, messages: &[Message], system_prompt: Option<&str>) {
        self.calls.lock().push(GenerationCall {
            structured,
            system_prompt: system_prompt.map(str::to_string),
            messages: messages.to_vec(),
        });
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate_text(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.record(false, messages, system_prompt);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.text_reply.clone()),
        }
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &Value,
        system_prompt: Option<&str>,
    ) -> Result<Value, GenerationError> {
        self.record(true, messages, system_prompt);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let properties = schema.get("properties").and_then(Value::as_object);
        self.structured_replies
            .iter()
            .find(|(key, _)| properties.is_some_and(|props| props.contains_key(key)))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| {
                GenerationError::InvalidResponse("no canned reply for this schema".to_string())
            })
    }
}

/// Returns the same verdict for every clause
pub struct StaticComplianceEvaluator {
    result: EvaluationResult,
    evaluations: AtomicUsize,
}

impl StaticComplianceEvaluator {
    pub fn new(result: EvaluationResult) -> Self {
        Self {
            result,
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn compliant() -> Self {
        Self::new(EvaluationResult {
            status: ComplianceStatus::Compliant,
            score: 100,
            reasoning: "Clause is consistent with the policy.".to_string(),
            flagged_issues: Vec::new(),
        })
    }

    pub fn non_compliant(reasoning: impl Into<String>, issues: Vec<String>) -> Self {
        Self::new(EvaluationResult {
            status: ComplianceStatus::NonCompliant,
            score: 10,
            reasoning: reasoning.into(),
            flagged_issues: issues,
        })
    }

    /// Number of `evaluate` calls so far
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComplianceEvaluator for StaticComplianceEvaluator {
    async fn evaluate(&self, _text: &str, _policy: &Policy) -> EvaluationResult {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Master data the mock risk source knows about a supplier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierRecord {
    pub name: String,
    pub duns: String,
    pub country_code: String,
}

/// Rule-driven supplier risk source
#[derive(Debug, Default)]
pub struct MockRiskIntelligence {
    suppliers: HashMap<String, SupplierRecord>,
    known_only: bool,
}

struct Headline {
    negative: bool,
}

impl MockRiskIntelligence {
    /// A source that treats unknown supplier ids as their own name and DUNS
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supplier(mut self, supplier_id: impl Into<String>, record: SupplierRecord) -> Self {
        self.suppliers.insert(supplier_id.into(), record);
        self
    }

    /// Reject supplier ids that were not registered
    pub fn known_only(mut self) -> Self {
        self.known_only = true;
        self
    }

    fn lookup(&self, supplier_id: &str) -> Result<SupplierRecord, IntelligenceError> {
        match self.suppliers.get(supplier_id) {
            Some(record) => Ok(record.clone()),
            None if self.known_only => {
                Err(IntelligenceError::SupplierNotFound(supplier_id.to_string()))
            }
            None => Ok(SupplierRecord {
                name: supplier_id.to_string(),
                duns: supplier_id.to_string(),
                country_code: "US".to_string(),
            }),
        }
    }

    fn financials(duns: &str) -> (u32, &'static str) {
        if duns.starts_with("999") {
            (25, "CC")
        } else {
            (85, "5A1")
        }
    }

    fn news(name: &str) -> Vec<Headline> {
        if name.contains("Risky") || name.contains("Volatile") {
            vec![Headline { negative: true }, Headline { negative: true }]
        } else if name.contains("Green") {
            vec![Headline { negative: false }, Headline { negative: false }]
        } else {
            Vec::new()
        }
    }

    fn sanctions(name: &str, country_code: &str) -> Option<&'static str> {
        let hit = matches!(country_code, "KP" | "RU" | "IR") || name.contains("Sanctioned");
        hit.then_some("OFAC SDN List")
    }
}

#[async_trait]
impl RiskIntelligence for MockRiskIntelligence {
    async fn refresh_profile(&self, supplier_id: &str) -> Result<RiskProfile, IntelligenceError> {
        let record = self.lookup(supplier_id)?;
        let (financial_stress_score, credit_rating) = Self::financials(&record.duns);
        let headlines = Self::news(&record.name);
        let sanctions = Self::sanctions(&record.name, &record.country_code);

        let adverse = headlines.iter().filter(|h| h.negative).count();
        let sentiment = if headlines.is_empty() {
            0.0
        } else {
            let favourable = headlines.len() - adverse;
            (favourable as f64 - adverse as f64) / headlines.len() as f64
        };

        let risk_score = combined_risk_score(financial_stress_score, sentiment, sanctions.is_some());
        let recommended_action = if sanctions.is_some() || risk_score > HIGH_RISK_THRESHOLD {
            RecommendedAction::Hold
        } else if risk_score > 40.0 {
            RecommendedAction::Monitor
        } else {
            RecommendedAction::Proceed
        };

        Ok(RiskProfile {
            supplier_id: supplier_id.to_string(),
            retrieved_at: chrono::Utc::now(),
            financial_stress_score,
            credit_rating: credit_rating.to_string(),
            sanctions_flag: sanctions.is_some(),
            sanctions_list_match: sanctions.map(str::to_string),
            news_sentiment_score: sentiment,
            adverse_media_count: adverse as u32,
            risk_summary: format!(
                "{} has credit rating {} and {} adverse headline(s).",
                record.name, credit_rating, adverse
            ),
            recommended_action,
            risk_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_structured_reply_is_counter() {
        let generator = MockTextGenerator::new();
        let schema = json!({"properties": {"decision": {}, "reasoning": {}}});
        let reply = generator.generate_structured(&[], &schema, None).await.unwrap();
        assert_eq!(reply["decision"], "COUNTER");
        assert_eq!(generator.calls().len(), 1);
        assert!(generator.calls()[0].structured);
    }

    #[tokio::test]
    async fn test_unknown_schema_has_no_reply() {
        let generator = MockTextGenerator::new();
        let schema = json!({"properties": {"headline": {}}});
        assert!(generator.generate_structured(&[], &schema, None).await.is_err());
    }

    #[tokio::test]
    async fn test_distressed_supplier_is_high_risk() {
        let risk = MockRiskIntelligence::new().with_supplier(
            "sup-1",
            SupplierRecord {
                name: "Risky Metals".to_string(),
                duns: "999123456".to_string(),
                country_code: "US".to_string(),
            },
        );
        let profile = risk.refresh_profile("sup-1").await.unwrap();
        assert_eq!(profile.credit_rating, "CC");
        assert_eq!(profile.adverse_media_count, 2);
        assert!(profile.is_high_risk());
        assert_eq!(profile.recommended_action, RecommendedAction::Hold);
    }

    #[tokio::test]
    async fn test_sanctioned_country() {
        let risk = MockRiskIntelligence::new().with_supplier(
            "sup-2",
            SupplierRecord {
                name: "Green Logistics".to_string(),
                duns: "123".to_string(),
                country_code: "IR".to_string(),
            },
        );
        let profile = risk.refresh_profile("sup-2").await.unwrap();
        assert!(profile.sanctions_flag);
        assert_eq!(profile.sanctions_list_match.as_deref(), Some("OFAC SDN List"));
        assert_eq!(profile.risk_score, 100.0);
    }

    #[tokio::test]
    async fn test_known_only_rejects_unregistered() {
        let risk = MockRiskIntelligence::new().known_only();
        assert_eq!(
            risk.refresh_profile("ghost").await.unwrap_err(),
            IntelligenceError::SupplierNotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_unregistered_supplier_is_stable() {
        let profile = MockRiskIntelligence::new()
            .refresh_profile("ACME-1")
            .await
            .unwrap();
        assert_eq!(profile.credit_rating, "5A1");
        assert!(!profile.is_high_risk());
        assert_eq!(profile.recommended_action, RecommendedAction::Proceed);
    }
}
