//! Supplier risk intelligence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Combined score above which a supplier counts as high risk
pub const HIGH_RISK_THRESHOLD: f64 = 70.0;

/// Errors raised by a [`RiskIntelligence`] source
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntelligenceError {
    #[error("Supplier not found: {0}")]
    SupplierNotFound(String),

    #[error("Data provider error: {0}")]
    Provider(String),
}

/// What the risk analysis suggests doing with the supplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Hold,
    Monitor,
    Proceed,
}

/// Snapshot stored in the `risk_profile` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub supplier_id: String,
    pub retrieved_at: DateTime<Utc>,
    /// 1 (distressed) to 100 (stable)
    pub financial_stress_score: u32,
    pub credit_rating: String,
    pub sanctions_flag: bool,
    pub sanctions_list_match: Option<String>,
    /// -1.0 (critical) to 1.0 (positive)
    pub news_sentiment_score: f64,
    pub adverse_media_count: u32,
    pub risk_summary: String,
    pub recommended_action: RecommendedAction,
    /// 0 (safe) to 100 (critical)
    pub risk_score: f64,
}

impl RiskProfile {
    pub fn is_high_risk(&self) -> bool {
        self.risk_score > HIGH_RISK_THRESHOLD
    }
}

/// Weighted risk score in `0.0..=100.0`
///
/// Financial distress counts 60%, news sentiment 40%. A sanctions hit
/// forces the maximum.
pub fn combined_risk_score(
    financial_stress_score: u32,
    news_sentiment_score: f64,
    sanctions_flag: bool,
) -> f64 {
    if sanctions_flag {
        return 100.0;
    }
    let financial_risk = 100.0 - f64::from(financial_stress_score);
    let sentiment_risk = (1.0 - news_sentiment_score) * 50.0;
    (financial_risk * 0.6 + sentiment_risk * 0.4).clamp(0.0, 100.0)
}

/// Source of supplier risk profiles
#[async_trait]
pub trait RiskIntelligence: Send + Sync {
    /// Gather fresh data for `supplier_id` and build a profile
    async fn refresh_profile(&self, supplier_id: &str) -> Result<RiskProfile, IntelligenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_score_weights() {
        // stable supplier, neutral news: 0.6 * 15 + 0.4 * 50
        assert!((combined_risk_score(85, 0.0, false) - 29.0).abs() < 1e-9);
        // distressed supplier, hostile press: 0.6 * 75 + 0.4 * 100
        assert!((combined_risk_score(25, -1.0, false) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_sanctions_force_maximum() {
        assert_eq!(combined_risk_score(100, 1.0, true), 100.0);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(combined_risk_score(100, 1.0, false), 0.0);
        assert_eq!(combined_risk_score(0, -3.0, false), 100.0);
    }
}
