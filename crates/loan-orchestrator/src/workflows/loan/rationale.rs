//! Structured decision rationale.
//!
//! Explanation only: every value here is a read-only projection of an
//! already-finalized decision. Nothing in this module feeds back into
//! decision state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::conversation::{
    format_amount, ConversationState, SanctionDecisionType, UnderwritingDecision,
};
use crate::config::PolicyConfig;

const DECISION_MODE: &str = "AI-assisted, rule-based underwriting";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RationaleDecision {
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "MANUAL_REVIEW")]
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
}

/// Qualitative risk signal supplied externally; consumed only here, never by
/// the eligibility rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub decision: RationaleDecision,
    pub confidence: Confidence,
    pub key_factors: Vec<String>,
    pub metrics: BTreeMap<String, Value>,
    pub decision_mode: String,
}

/// Builds the ordered factor list and confidence grade for a finalized
/// decision. Pure function of its inputs.
pub fn build_rationale(
    decision: RationaleDecision,
    loan_amount: f64,
    salary: f64,
    emi: f64,
    risk_score: Option<u8>,
    risk_level: Option<RiskLevel>,
    policy: &PolicyConfig,
) -> Rationale {
    let emi_ratio = if salary > 0.0 { emi / salary * 100.0 } else { 0.0 };
    let emi_ratio_str = format!("{emi_ratio:.1}%");

    let mut key_factors: Vec<String> = Vec::new();
    let mut confidence = Confidence::High;

    match decision {
        RationaleDecision::Approved => {
            key_factors.push("EMI-to-income ratio is within acceptable limits (<=50%)".to_string());
            key_factors.push(format!(
                "Loan amount (Rs. {}) qualifies for automated approval",
                format_amount(loan_amount)
            ));

            match risk_level {
                Some(RiskLevel::Low) => {
                    key_factors.push("Risk assessment indicates low-risk profile".to_string());
                    confidence = Confidence::High;
                }
                Some(RiskLevel::Medium) => {
                    key_factors.push("Risk assessment indicates moderate profile".to_string());
                    confidence = Confidence::High;
                }
                _ => confidence = Confidence::Medium,
            }

            if emi_ratio <= 30.0 {
                key_factors.push("Excellent debt-to-income ratio".to_string());
            } else if emi_ratio <= 40.0 {
                key_factors.push("Healthy EMI burden relative to income".to_string());
            }
        }
        RationaleDecision::Rejected => {
            if emi_ratio > 50.0 {
                key_factors.push(format!(
                    "EMI-to-income ratio ({emi_ratio_str}) exceeds 50% threshold"
                ));
                key_factors.push("Monthly EMI burden is too high relative to income".to_string());
            }
            key_factors
                .push("Based on current eligibility rules, approval is not possible".to_string());
            key_factors.push(
                "This decision can be reviewed upon change in financial circumstances".to_string(),
            );
            confidence = Confidence::High;
        }
        RationaleDecision::ManualReview => {
            if loan_amount > policy.auto_approval_limit {
                key_factors.push(format!(
                    "Loan amount (Rs. {}) exceeds auto-approval limit (Rs. {})",
                    format_amount(loan_amount),
                    format_amount(policy.auto_approval_limit)
                ));
                key_factors.push("Higher loan amounts require human verification".to_string());
            }

            if risk_level == Some(RiskLevel::High) {
                key_factors.push("Elevated risk score requires manual assessment".to_string());
                confidence = Confidence::Medium;
            } else {
                confidence = Confidence::High;
            }

            key_factors.push("A credit officer will review your application".to_string());
            key_factors.push("Expected turnaround: 1-2 business days".to_string());
        }
    }

    let mut metrics = BTreeMap::new();
    metrics.insert("loan_amount".to_string(), json!(loan_amount));
    metrics.insert("monthly_income".to_string(), json!(salary));
    metrics.insert("emi".to_string(), json!((emi * 100.0).round() / 100.0));
    metrics.insert("emi_ratio".to_string(), json!(emi_ratio_str));
    if let Some(score) = risk_score {
        metrics.insert("risk_score".to_string(), json!(score));
    }
    if let Some(level) = risk_level {
        metrics.insert("risk_level".to_string(), json!(format!("{level:?}")));
    }

    Rationale {
        decision,
        confidence,
        key_factors,
        metrics,
        decision_mode: DECISION_MODE.to_string(),
    }
}

/// Projects the session's finalized decision into a rationale, when one
/// exists. Used by the status endpoint; never alters outcomes.
pub fn rationale_for_state(state: &ConversationState, policy: &PolicyConfig) -> Option<Rationale> {
    let amount = state.loan.amount.unwrap_or(0.0);
    let salary = state.applicant.monthly_salary.unwrap_or(0.0);
    let emi = state.loan.expected_emi.unwrap_or(0.0);

    if let Some(decision) = &state.decision {
        let rationale_decision = match decision.decision_type {
            SanctionDecisionType::Automated => RationaleDecision::Approved,
            SanctionDecisionType::HumanReview => RationaleDecision::ManualReview,
        };
        return Some(build_rationale(
            rationale_decision,
            amount,
            salary,
            emi,
            None,
            None,
            policy,
        ));
    }

    if state.underwriting_decision == Some(UnderwritingDecision::Rejected) {
        return Some(build_rationale(
            RationaleDecision::Rejected,
            amount,
            salary,
            emi,
            None,
            None,
            policy,
        ));
    }

    None
}
