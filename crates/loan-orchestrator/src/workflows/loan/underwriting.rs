use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PolicyConfig;

/// Credit bureau lookup. Implementations must return a deterministic default
/// for unknown customers rather than failing the turn.
pub trait CreditLookup: Send + Sync {
    fn fetch_score(&self, customer_id: &str) -> Result<u16, LookupError>;
}

/// Offer mart lookup for the pre-approved ceiling amount.
pub trait LimitLookup: Send + Sync {
    fn fetch_preapproved_limit(&self, customer_id: &str) -> Result<u64, LookupError>;
}

/// Failure of an external lookup. Degraded to a policy default at the engine
/// boundary; an unavailable bureau must not crash a turn.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup backend unavailable: {0}")]
    Unavailable(String),
}

/// Ephemeral inputs assembled per underwriting call; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanApplicationFacts {
    pub amount: f64,
    pub salary: Option<f64>,
    pub expected_emi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    Instant,
    SalaryVerified,
}

/// Eligibility verdict. Exactly one variant per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnderwritingResult {
    Approved { approval_type: ApprovalType },
    SalarySlipRequired,
    Rejected { reason: String },
}

/// Evaluation output carrying the resolved lookup inputs for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingOutcome {
    pub result: UnderwritingResult,
    pub credit_score: u16,
    pub preapproved_limit: u64,
}

/// Stateless rule cascade over credit score, pre-approved limit, amount,
/// salary, and EMI. First match wins; all boundaries are inclusive at `<=`.
pub struct UnderwritingEngine {
    credit: Arc<dyn CreditLookup>,
    limits: Arc<dyn LimitLookup>,
    policy: PolicyConfig,
}

impl UnderwritingEngine {
    pub fn new(
        credit: Arc<dyn CreditLookup>,
        limits: Arc<dyn LimitLookup>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            credit,
            limits,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn evaluate(&self, customer_id: &str, facts: &LoanApplicationFacts) -> UnderwritingOutcome {
        let credit_score = match self.credit.fetch_score(customer_id) {
            Ok(score) => score,
            Err(err) => {
                warn!(%customer_id, error = %err, "credit lookup failed, using fallback score");
                self.policy.fallback_credit_score
            }
        };

        let preapproved_limit = match self.limits.fetch_preapproved_limit(customer_id) {
            Ok(limit) => limit,
            Err(err) => {
                warn!(%customer_id, error = %err, "limit lookup failed, using fallback limit");
                self.policy.fallback_preapproved_limit
            }
        };

        let result = self.cascade(facts, credit_score, preapproved_limit);

        info!(
            %customer_id,
            amount = facts.amount,
            credit_score,
            preapproved_limit,
            result = ?result,
            "underwriting evaluated"
        );

        UnderwritingOutcome {
            result,
            credit_score,
            preapproved_limit,
        }
    }

    fn cascade(
        &self,
        facts: &LoanApplicationFacts,
        credit_score: u16,
        preapproved_limit: u64,
    ) -> UnderwritingResult {
        // The score gate dominates: a sub-threshold score rejects even an
        // amount within the pre-approved limit.
        if credit_score < self.policy.minimum_credit_score {
            return UnderwritingResult::Rejected {
                reason: "Low credit score".to_string(),
            };
        }

        let limit = preapproved_limit as f64;
        if facts.amount <= limit {
            return UnderwritingResult::Approved {
                approval_type: ApprovalType::Instant,
            };
        }

        if facts.amount <= self.policy.limit_stretch_multiplier * limit {
            let (salary, emi) = match (facts.salary, facts.expected_emi) {
                (Some(salary), Some(emi)) => (salary, emi),
                _ => return UnderwritingResult::SalarySlipRequired,
            };

            // The ratio boundary of exactly 50% approves.
            if emi <= self.policy.max_emi_income_ratio * salary {
                return UnderwritingResult::Approved {
                    approval_type: ApprovalType::SalaryVerified,
                };
            }
            return UnderwritingResult::Rejected {
                reason: "EMI exceeds 50% of salary".to_string(),
            };
        }

        UnderwritingResult::Rejected {
            reason: "Loan amount exceeds eligibility".to_string(),
        }
    }
}
