use std::sync::Arc;

use tracing::{error, info};

use super::conversation::{
    format_amount, ConversationState, MessageRole, Stage, TurnDelta, TurnReply,
    UnderwritingDecision,
};
use super::router::{next_stage, IntentDetector, IntentSignal};
use super::sanction::SanctionPolicyGate;
use super::underwriting::{
    ApprovalType, LoanApplicationFacts, UnderwritingEngine, UnderwritingResult,
};
use crate::config::PolicyConfig;

const SAFE_REPLY: &str = "I apologize, but I encountered an issue. Let me help you with your \
                          loan application. What type of loan are you interested in?";

const REJECTION_REPLY: &str = "We regret to inform you that your loan application could not be \
                               approved at this time based on our eligibility criteria. Please \
                               contact our support team for more information.";

const COURTESY_REPLY: &str = "Thank you for your interest. Is there anything else I can help \
                              you with?";

const DEFAULT_UNDERWRITING_AMOUNT: f64 = 100_000.0;

/// Intake collaborator serving the `sales` stage.
pub trait SalesHandler: Send + Sync {
    fn handle(&self, state: &ConversationState, message: &str) -> Result<TurnDelta, HandlerError>;
}

/// Identity-check collaborator serving the `verification` stage.
pub trait VerificationHandler: Send + Sync {
    fn handle(&self, state: &ConversationState, message: &str) -> Result<TurnDelta, HandlerError>;
}

/// Typed fault union for everything below the supervisor. Components degrade
/// their own expected failures; whatever still surfaces lands here and is
/// caught exactly once at the supervisor boundary.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

/// Owns the per-turn control flow: route, dispatch, commit the delta,
/// possibly re-route once after underwriting, and always answer.
pub struct Supervisor {
    intents: Arc<dyn IntentDetector>,
    sales: Arc<dyn SalesHandler>,
    verification: Arc<dyn VerificationHandler>,
    underwriting: UnderwritingEngine,
    sanction: SanctionPolicyGate,
}

impl Supervisor {
    pub fn new(
        intents: Arc<dyn IntentDetector>,
        sales: Arc<dyn SalesHandler>,
        verification: Arc<dyn VerificationHandler>,
        underwriting: UnderwritingEngine,
        sanction: SanctionPolicyGate,
    ) -> Self {
        Self {
            intents,
            sales,
            verification,
            underwriting,
            sanction,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        self.underwriting.policy()
    }

    /// Process one user turn. Never propagates a fault: any collaborator
    /// error is converted into a fixed safe reply and a safety reset of the
    /// visible state back to `sales`.
    pub fn handle_turn(&self, state: &mut ConversationState, message: &str) -> TurnReply {
        state.push_message(MessageRole::User, message);

        match self.run_turn(state, message) {
            Ok(reply) => {
                state.push_message(MessageRole::Assistant, reply.reply.clone());
                reply
            }
            Err(fault) => {
                error!(session_id = %state.session_id, error = %fault, "turn failed, resetting to sales");
                state.stage = Stage::Sales;
                state.active_agent = Stage::Sales.agent();
                state.push_message(MessageRole::Assistant, SAFE_REPLY);
                TurnReply {
                    reply: SAFE_REPLY.to_string(),
                    stage: state.stage,
                    active_agent: state.active_agent,
                }
            }
        }
    }

    fn run_turn(
        &self,
        state: &mut ConversationState,
        message: &str,
    ) -> Result<TurnReply, HandlerError> {
        let signal = self.intents.detect(message);
        let previous = state.stage;
        let next = next_stage(previous, state, &signal);

        if next != previous {
            info!(
                session_id = %state.session_id,
                from = previous.label(),
                to = next.label(),
                "stage transition"
            );
        }

        // The verification → underwriting trigger is the identity
        // confirmation itself, so the gate flips here.
        if previous == Stage::Verification && next == Stage::Underwriting && !state.verified {
            info!(session_id = %state.session_id, "identity confirmed");
            state.verified = true;
        }

        state.stage = next;
        state.active_agent = next.agent();

        let delta = self.dispatch(next, state, message)?;
        state.apply(&delta);
        let mut reply = delta.reply;

        // Same-turn re-route: an underwriting turn that produced a decision
        // surfaces the terminal reply without another round trip.
        if next == Stage::Underwriting && state.underwriting_decision.is_some() {
            let final_stage = next_stage(Stage::Underwriting, state, &signal);
            info!(
                session_id = %state.session_id,
                from = Stage::Underwriting.label(),
                to = final_stage.label(),
                "same-turn re-route"
            );
            state.stage = final_stage;
            state.active_agent = final_stage.agent();

            match final_stage {
                Stage::Sanction => {
                    let terminal = self.sanction.decide(state).into_delta();
                    state.apply(&terminal);
                    reply = terminal.reply;
                }
                Stage::Rejected => {
                    reply = REJECTION_REPLY.to_string();
                }
                _ => {}
            }
        }

        Ok(TurnReply {
            reply,
            stage: state.stage,
            active_agent: state.active_agent,
        })
    }

    fn dispatch(
        &self,
        stage: Stage,
        state: &ConversationState,
        message: &str,
    ) -> Result<TurnDelta, HandlerError> {
        match stage {
            Stage::Sales => self.sales.handle(state, message),
            Stage::Verification => self.verification.handle(state, message),
            Stage::Underwriting => Ok(self.underwrite(state)),
            Stage::Sanction => Ok(self.sanction.decide(state).into_delta()),
            Stage::Rejected => Ok(TurnDelta::reply(COURTESY_REPLY)),
        }
    }

    fn underwrite(&self, state: &ConversationState) -> TurnDelta {
        let customer_id = state
            .applicant
            .customer_id
            .clone()
            .unwrap_or_else(|| state.session_id.clone());

        let facts = LoanApplicationFacts {
            amount: state.loan.amount.unwrap_or(DEFAULT_UNDERWRITING_AMOUNT),
            salary: state.applicant.monthly_salary,
            expected_emi: state.loan.expected_emi,
        };

        let outcome = self.underwriting.evaluate(&customer_id, &facts);

        match outcome.result {
            UnderwritingResult::Approved { approval_type } => {
                let reply = match approval_type {
                    ApprovalType::Instant => format!(
                        "Good news! Your requested amount is within your pre-approved limit of \
                         Rs. {}. Your loan is approved for instant processing.",
                        format_amount(outcome.preapproved_limit as f64)
                    ),
                    ApprovalType::SalaryVerified => "Good news! Your income comfortably covers \
                                                     the expected EMI, so your loan is approved \
                                                     with salary verification."
                        .to_string(),
                };
                TurnDelta {
                    reply,
                    underwriting_decision: Some(UnderwritingDecision::Approved),
                    ..TurnDelta::default()
                }
            }
            UnderwritingResult::SalarySlipRequired => TurnDelta::reply(
                "Your requested amount is above the pre-approved limit, so we need income \
                 proof. Please share your monthly salary and expected EMI (a recent salary \
                 slip works).",
            ),
            UnderwritingResult::Rejected { reason } => TurnDelta {
                reply: format!(
                    "We are unable to approve this application: {reason}. You may contact our \
                     support team for details."
                ),
                underwriting_decision: Some(UnderwritingDecision::Rejected),
                ..TurnDelta::default()
            },
        }
    }
}
