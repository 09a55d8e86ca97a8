//! Loan origination conversation workflow.
//!
//! A single session moves through a fixed lifecycle: intake (sales), identity
//! verification, underwriting, and sanctioning. The supervisor owns the
//! per-turn control flow; every stage handler returns an immutable
//! [`TurnDelta`] which only the supervisor commits, so the routing logic can
//! run twice in one turn without hidden state drift.

pub mod conversation;
pub mod rationale;
pub mod router;
pub mod routes;
pub mod sanction;
pub mod session;
pub mod supervisor;
pub mod underwriting;

#[cfg(test)]
mod tests;

pub use conversation::{
    AgentKind, ApplicantDetails, ConversationState, ConversationStateView, DecisionMetadata,
    LoanDetails, MessageEntry, MessageRole, SanctionDecisionType, Stage, TurnDelta, TurnReply,
    UnderwritingDecision,
};
pub use rationale::{
    build_rationale, rationale_for_state, Confidence, Rationale, RationaleDecision, RiskLevel,
};
pub use router::{next_stage, IntentDetector, IntentSignal, KeywordIntentDetector};
pub use routes::conversation_router;
pub use sanction::{
    BlobCodec, CodecError, DecisionContext, ExplanationError, ExplanationService, LetterArtifact,
    LetterRenderer, RenderError, SanctionLetterDetails, SanctionOutcome, SanctionPolicyGate,
};
pub use session::{SessionStore, SessionStoreError};
pub use supervisor::{HandlerError, SalesHandler, Supervisor, VerificationHandler};
pub use underwriting::{
    ApprovalType, CreditLookup, LimitLookup, LoanApplicationFacts, LookupError, UnderwritingEngine,
    UnderwritingOutcome, UnderwritingResult,
};
