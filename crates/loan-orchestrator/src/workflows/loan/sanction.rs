use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::conversation::{
    format_amount, ConversationState, DecisionMetadata, SanctionDecisionType, TurnDelta,
};
use crate::config::PolicyConfig;

const DEFAULT_CUSTOMER_NAME: &str = "Valued Customer";
const DEFAULT_LOAN_AMOUNT: f64 = 100_000.0;
const DEFAULT_TENURE_MONTHS: u16 = 24;
const DEFAULT_EMI: f64 = 4_650.0;
const DEFAULT_INTEREST_RATE: f64 = 10.5;

/// Assembled inputs for the sanction letter artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionLetterDetails {
    pub session_id: String,
    pub customer_name: String,
    pub loan_amount: f64,
    pub tenure_months: u16,
    pub emi: f64,
    pub interest_rate: f64,
}

/// Reference to a rendered sanction artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterArtifact {
    pub file: String,
}

/// External artifact renderer. Failure must not invalidate an already-made
/// automated-approval decision.
pub trait LetterRenderer: Send + Sync {
    fn render(&self, details: &SanctionLetterDetails) -> Result<LetterArtifact, RenderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("letter output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

/// Context handed to the natural-language narrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionContext {
    pub status: &'static str,
    pub reason: String,
    pub loan_amount: f64,
    pub salary: Option<f64>,
    pub emi: f64,
}

/// External explanation generator; the gate substitutes a fixed template on
/// failure so the decision output is never blocked by this collaborator.
pub trait ExplanationService: Send + Sync {
    fn narrate(&self, context: &DecisionContext) -> Result<String, ExplanationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExplanationError {
    #[error("explanation backend unavailable: {0}")]
    Unavailable(String),
}

/// Decrypts the identity verification payload. Best-effort enrichment only;
/// failures are swallowed and the default value kept.
pub trait BlobCodec: Send + Sync {
    fn decrypt(&self, blob: &str) -> Result<String, CodecError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unable to decrypt payload: {0}")]
    Decrypt(String),
    #[error("decrypted payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Structured sanctioning result. `Blocked` is an expected control-flow
/// outcome, not a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum SanctionOutcome {
    Automated {
        reply: String,
        decision: DecisionMetadata,
        letter: Option<LetterArtifact>,
    },
    HumanReview {
        reply: String,
        decision: DecisionMetadata,
    },
    Blocked {
        reply: String,
    },
}

impl SanctionOutcome {
    pub fn into_delta(self) -> TurnDelta {
        match self {
            SanctionOutcome::Automated {
                reply,
                decision,
                letter,
            } => TurnDelta {
                reply,
                decision: Some(decision),
                sanction_letter: letter.map(|artifact| artifact.file),
                ..TurnDelta::default()
            },
            SanctionOutcome::HumanReview { reply, decision } => TurnDelta {
                reply,
                decision: Some(decision),
                ..TurnDelta::default()
            },
            SanctionOutcome::Blocked { reply } => TurnDelta::reply(reply),
        }
    }
}

/// Applies the automated-vs-human-review policy to a verified application and
/// requests the sanction artifact for the automated path.
pub struct SanctionPolicyGate {
    renderer: Arc<dyn LetterRenderer>,
    explainer: Arc<dyn ExplanationService>,
    codec: Arc<dyn BlobCodec>,
    policy: PolicyConfig,
}

impl SanctionPolicyGate {
    pub fn new(
        renderer: Arc<dyn LetterRenderer>,
        explainer: Arc<dyn ExplanationService>,
        codec: Arc<dyn BlobCodec>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            renderer,
            explainer,
            codec,
            policy,
        }
    }

    pub fn decide(&self, state: &ConversationState) -> SanctionOutcome {
        // Sanctioning never proceeds without verification, regardless of
        // stage. Decision metadata stays untouched.
        if !state.verified {
            warn!(session_id = %state.session_id, "sanction attempted without verification");
            return SanctionOutcome::Blocked {
                reply: "Cannot proceed: verification incomplete. Please complete identity \
                        verification first."
                    .to_string(),
            };
        }

        let details = self.letter_details(state);
        let limit = self.policy.auto_approval_limit;

        if details.loan_amount <= limit {
            self.automated(state, details)
        } else {
            info!(
                session_id = %state.session_id,
                amount = details.loan_amount,
                limit,
                "sanction routed to human review"
            );
            self.human_review(details)
        }
    }

    fn automated(
        &self,
        state: &ConversationState,
        details: SanctionLetterDetails,
    ) -> SanctionOutcome {
        let limit = self.policy.auto_approval_limit;
        let decision = DecisionMetadata {
            decision_type: SanctionDecisionType::Automated,
            decision_source: "System (Policy-Based)".to_string(),
            decision_reason: format!(
                "Loan amount (Rs. {}) is within the automated approval limit of Rs. {}",
                format_amount(details.loan_amount),
                format_amount(limit)
            ),
            policy_applied: format!("AUTO_APPROVAL_LIMIT: Rs. {}", format_amount(limit)),
            decided_at: Utc::now(),
        };

        // Renderer failure degrades only the artifact-availability message;
        // the approval stands.
        let letter = match self.renderer.render(&details) {
            Ok(artifact) => {
                info!(session_id = %details.session_id, file = %artifact.file, "sanction letter generated");
                Some(artifact)
            }
            Err(err) => {
                warn!(session_id = %details.session_id, error = %err, "sanction letter rendering failed");
                None
            }
        };

        let narrative = self.narrative(state, &details);
        let summary = loan_summary(&details);
        let reply = match &letter {
            Some(artifact) => format!(
                "{narrative}\n\n{summary}\n\nThis loan falls within the automated approval \
                 policy (up to Rs. {}) and has been approved.\n\nDecision: Approved by System \
                 (Policy-Based)\nYour sanction letter has been generated: {}",
                format_amount(limit),
                artifact.file
            ),
            None => format!(
                "{narrative}\n\n{summary}\n\nThis loan falls within the automated approval \
                 policy (up to Rs. {}) and has been approved. There was an issue generating \
                 the sanction letter; our team will send it to you shortly via email.\n\n\
                 Decision: Approved by System (Policy-Based)",
                format_amount(limit)
            ),
        };

        info!(session_id = %details.session_id, amount = details.loan_amount, "automated approval completed");

        SanctionOutcome::Automated {
            reply,
            decision,
            letter,
        }
    }

    fn human_review(&self, details: SanctionLetterDetails) -> SanctionOutcome {
        let limit = self.policy.auto_approval_limit;
        let decision = DecisionMetadata {
            decision_type: SanctionDecisionType::HumanReview,
            decision_source: "Human-in-the-Loop".to_string(),
            decision_reason: format!(
                "Loan amount (Rs. {}) exceeds the automated approval limit of Rs. {}",
                format_amount(details.loan_amount),
                format_amount(limit)
            ),
            policy_applied: format!("AUTO_APPROVAL_LIMIT: Rs. {}", format_amount(limit)),
            decided_at: Utc::now(),
        };

        let reply = format!(
            "Your loan application has passed all automated eligibility checks and has been \
             forwarded for manual review.\n\n{}\n\nThis loan exceeds the automated approval \
             limit (Rs. {}) and has been forwarded for manual review by our credit team.\n\n\
             Decision: Pending Human Review\nExpected turnaround: 1-2 business days\n\nYou \
             will receive an update via email once the review is complete. Thank you for your \
             patience.",
            loan_summary(&details),
            format_amount(limit)
        );

        SanctionOutcome::HumanReview { reply, decision }
    }

    fn narrative(&self, state: &ConversationState, details: &SanctionLetterDetails) -> String {
        let context = DecisionContext {
            status: "APPROVED_AUTOMATED",
            reason: "All eligibility criteria met - within automated approval policy".to_string(),
            loan_amount: details.loan_amount,
            salary: state.applicant.monthly_salary,
            emi: details.emi,
        };

        match self.explainer.narrate(&context) {
            Ok(text) => text,
            Err(err) => {
                warn!(session_id = %details.session_id, error = %err, "explanation service failed, using template");
                "Congratulations! Your loan application has been approved.".to_string()
            }
        }
    }

    fn letter_details(&self, state: &ConversationState) -> SanctionLetterDetails {
        let mut customer_name = state
            .applicant
            .customer_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string());

        // Prefer the name from the verified payload when it decrypts cleanly.
        if let Some(blob) = &state.applicant.verification_blob {
            match self.verified_name(blob) {
                Ok(Some(name)) => customer_name = name,
                Ok(None) => {}
                Err(err) => {
                    warn!(session_id = %state.session_id, error = %err, "failed to decrypt verification blob");
                }
            }
        }

        SanctionLetterDetails {
            session_id: state.session_id.clone(),
            customer_name,
            loan_amount: state.loan.amount.unwrap_or(DEFAULT_LOAN_AMOUNT),
            tenure_months: state.loan.tenure_months.unwrap_or(DEFAULT_TENURE_MONTHS),
            emi: state.loan.expected_emi.unwrap_or(DEFAULT_EMI),
            interest_rate: state.loan.interest_rate.unwrap_or(DEFAULT_INTEREST_RATE),
        }
    }

    fn verified_name(&self, blob: &str) -> Result<Option<String>, CodecError> {
        let plaintext = self.codec.decrypt(blob)?;
        let parsed: serde_json::Value = serde_json::from_str(&plaintext)?;
        let name = parsed
            .get("name")
            .or_else(|| parsed.get("full_name"))
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());
        Ok(name)
    }
}

fn loan_summary(details: &SanctionLetterDetails) -> String {
    format!(
        "Loan Summary:\n- Amount: Rs. {}\n- Interest Rate: {}% p.a.\n- Tenure: {} months\n- \
         Monthly EMI: Rs. {:.2}",
        format_amount(details.loan_amount),
        details.interest_rate,
        details.tenure_months,
        details.emi
    )
}
