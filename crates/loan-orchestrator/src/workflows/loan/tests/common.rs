use std::sync::{Arc, Mutex};

use crate::config::PolicyConfig;
use crate::workflows::loan::conversation::{ConversationState, Stage, TurnDelta};
use crate::workflows::loan::router::KeywordIntentDetector;
use crate::workflows::loan::sanction::{
    BlobCodec, CodecError, DecisionContext, ExplanationError, ExplanationService, LetterArtifact,
    LetterRenderer, RenderError, SanctionLetterDetails, SanctionPolicyGate,
};
use crate::workflows::loan::supervisor::{
    HandlerError, SalesHandler, Supervisor, VerificationHandler,
};
use crate::workflows::loan::underwriting::{
    CreditLookup, LimitLookup, LookupError, UnderwritingEngine,
};

pub(super) struct FixedCreditBureau {
    pub score: u16,
}

impl CreditLookup for FixedCreditBureau {
    fn fetch_score(&self, _customer_id: &str) -> Result<u16, LookupError> {
        Ok(self.score)
    }
}

pub(super) struct UnavailableCreditBureau;

impl CreditLookup for UnavailableCreditBureau {
    fn fetch_score(&self, _customer_id: &str) -> Result<u16, LookupError> {
        Err(LookupError::Unavailable("bureau offline".to_string()))
    }
}

pub(super) struct FixedOfferMart {
    pub limit: u64,
}

impl LimitLookup for FixedOfferMart {
    fn fetch_preapproved_limit(&self, _customer_id: &str) -> Result<u64, LookupError> {
        Ok(self.limit)
    }
}

pub(super) struct UnavailableOfferMart;

impl LimitLookup for UnavailableOfferMart {
    fn fetch_preapproved_limit(&self, _customer_id: &str) -> Result<u64, LookupError> {
        Err(LookupError::Unavailable("offer mart offline".to_string()))
    }
}

/// Captures rendered letters so tests can assert on the artifact boundary.
#[derive(Default)]
pub(super) struct RecordingRenderer {
    pub rendered: Mutex<Vec<SanctionLetterDetails>>,
}

impl LetterRenderer for RecordingRenderer {
    fn render(&self, details: &SanctionLetterDetails) -> Result<LetterArtifact, RenderError> {
        self.rendered
            .lock()
            .expect("renderer mutex poisoned")
            .push(details.clone());
        Ok(LetterArtifact {
            file: format!("sanction_{}.txt", details.session_id),
        })
    }
}

pub(super) struct FailingRenderer;

impl LetterRenderer for FailingRenderer {
    fn render(&self, _details: &SanctionLetterDetails) -> Result<LetterArtifact, RenderError> {
        Err(RenderError::Unavailable("renderer offline".to_string()))
    }
}

pub(super) struct TemplateExplainer;

impl ExplanationService for TemplateExplainer {
    fn narrate(&self, context: &DecisionContext) -> Result<String, ExplanationError> {
        Ok(format!("Narrated: {}", context.status))
    }
}

pub(super) struct FailingExplainer;

impl ExplanationService for FailingExplainer {
    fn narrate(&self, _context: &DecisionContext) -> Result<String, ExplanationError> {
        Err(ExplanationError::Unavailable(
            "narrator offline".to_string(),
        ))
    }
}

/// Treats the blob as already-plaintext JSON.
pub(super) struct PassthroughCodec;

impl BlobCodec for PassthroughCodec {
    fn decrypt(&self, blob: &str) -> Result<String, CodecError> {
        Ok(blob.to_string())
    }
}

pub(super) struct FailingCodec;

impl BlobCodec for FailingCodec {
    fn decrypt(&self, _blob: &str) -> Result<String, CodecError> {
        Err(CodecError::Decrypt("bad key".to_string()))
    }
}

pub(super) struct GreetingSales;

impl SalesHandler for GreetingSales {
    fn handle(&self, _state: &ConversationState, _message: &str) -> Result<TurnDelta, HandlerError> {
        Ok(TurnDelta::reply("How much would you like to borrow?"))
    }
}

pub(super) struct PromptingVerification;

impl VerificationHandler for PromptingVerification {
    fn handle(&self, _state: &ConversationState, _message: &str) -> Result<TurnDelta, HandlerError> {
        Ok(TurnDelta::reply("Please share your PAN or Aadhaar."))
    }
}

pub(super) struct FaultySales;

impl SalesHandler for FaultySales {
    fn handle(&self, _state: &ConversationState, _message: &str) -> Result<TurnDelta, HandlerError> {
        Err(HandlerError::Collaborator("sales backend down".to_string()))
    }
}

pub(super) fn engine(score: u16, limit: u64) -> UnderwritingEngine {
    UnderwritingEngine::new(
        Arc::new(FixedCreditBureau { score }),
        Arc::new(FixedOfferMart { limit }),
        PolicyConfig::default(),
    )
}

pub(super) fn gate(renderer: Arc<dyn LetterRenderer>) -> SanctionPolicyGate {
    SanctionPolicyGate::new(
        renderer,
        Arc::new(TemplateExplainer),
        Arc::new(PassthroughCodec),
        PolicyConfig::default(),
    )
}

pub(super) fn supervisor(score: u16, limit: u64) -> Supervisor {
    supervisor_with_sales(Arc::new(GreetingSales), score, limit)
}

pub(super) fn supervisor_with_sales(
    sales: Arc<dyn SalesHandler>,
    score: u16,
    limit: u64,
) -> Supervisor {
    Supervisor::new(
        Arc::new(KeywordIntentDetector::default()),
        sales,
        Arc::new(PromptingVerification),
        engine(score, limit),
        gate(Arc::new(RecordingRenderer::default())),
    )
}

pub(super) fn verified_state(session_id: &str, amount: f64) -> ConversationState {
    let mut state = ConversationState::new(session_id);
    state.stage = Stage::Sanction;
    state.active_agent = Stage::Sanction.agent();
    state.verified = true;
    state.loan.amount = Some(amount);
    state.loan.tenure_months = Some(24);
    state.loan.interest_rate = Some(10.5);
    state.loan.expected_emi = Some(4_650.0);
    state.applicant.customer_name = Some("Asha Rao".to_string());
    state
}
