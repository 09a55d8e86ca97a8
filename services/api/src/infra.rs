use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::Local;
use loan_orchestrator::config::PolicyConfig;
use metrics_exporter_prometheus::PrometheusHandle;

use loan_orchestrator::workflows::loan::{
    BlobCodec, CodecError, ConversationState, CreditLookup, DecisionContext, ExplanationError,
    ExplanationService, HandlerError, KeywordIntentDetector, LetterArtifact, LetterRenderer,
    LimitLookup, LoanDetails, LookupError, RenderError, SalesHandler, SanctionLetterDetails,
    SanctionPolicyGate, SessionStore, SessionStoreError, Supervisor, TurnDelta,
    UnderwritingEngine, VerificationHandler,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Single-process session store. Individual fetch/upsert calls are atomic;
/// turn-level serialization per session is the deployment contract (one
/// worker per session).
#[derive(Default, Clone)]
pub(crate) struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, ConversationState>>>,
}

impl SessionStore for InMemorySessionStore {
    fn fetch(&self, session_id: &str) -> Result<Option<ConversationState>, SessionStoreError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        Ok(guard.get(session_id).cloned())
    }

    fn upsert(&self, state: ConversationState) -> Result<(), SessionStoreError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        guard.insert(state.session_id.clone(), state);
        Ok(())
    }
}

/// Mock credit bureau with the seeded demo dataset; unknown customers fall
/// back to the deterministic default instead of erroring.
pub(crate) struct MockCreditBureau;

impl CreditLookup for MockCreditBureau {
    fn fetch_score(&self, customer_id: &str) -> Result<u16, LookupError> {
        Ok(match customer_id {
            "1" => 750,
            "2" => 600,
            "3" => 680,
            _ => 650,
        })
    }
}

/// Mock offer mart with seeded pre-approved limits.
pub(crate) struct MockOfferMart;

impl LimitLookup for MockOfferMart {
    fn fetch_preapproved_limit(&self, customer_id: &str) -> Result<u64, LookupError> {
        Ok(match customer_id {
            "1" => 500_000,
            "2" => 200_000,
            "3" => 300_000,
            _ => 100_000,
        })
    }
}

/// Writes sanction letters as plain text files. PDF rendering lives behind
/// the same trait in production deployments.
pub(crate) struct TextLetterRenderer {
    output_dir: PathBuf,
}

impl TextLetterRenderer {
    pub(crate) fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl LetterRenderer for TextLetterRenderer {
    fn render(&self, details: &SanctionLetterDetails) -> Result<LetterArtifact, RenderError> {
        fs::create_dir_all(&self.output_dir)?;

        let filename = format!("sanction_{}.txt", details.session_id);
        let path = self.output_dir.join(&filename);
        let approval_date = Local::now().format("%d %B %Y");

        let body = format!(
            "LOANOPS FINANCIAL SERVICES\nPERSONAL LOAN SANCTION LETTER\n\nDate: {approval_date}\n\
             Reference No: LOA/{}/{}\n\nDear {},\n\nWe are pleased to inform you that your \
             Personal Loan application has been approved.\n\nSanctioned Loan Amount: Rs. {:.0}\n\
             Rate of Interest: {}% per annum\nLoan Tenure: {} months\nEquated Monthly Instalment \
             (EMI): Rs. {:.2}\n\nThis sanction is valid for 30 days from the date of issue.\n\
             This is a system-generated sanction letter and does not require a physical \
             signature.\n",
            details.session_id.to_uppercase(),
            Local::now().format("%Y%m%d"),
            details.customer_name,
            details.loan_amount,
            details.interest_rate,
            details.tenure_months,
            details.emi,
        );

        fs::write(&path, body)?;
        Ok(LetterArtifact { file: filename })
    }
}

/// Fixed-template narrator standing in for the hosted explanation model.
pub(crate) struct TemplateExplanationService;

impl ExplanationService for TemplateExplanationService {
    fn narrate(&self, context: &DecisionContext) -> Result<String, ExplanationError> {
        Ok(format!(
            "Congratulations! Your loan application has been approved. {}",
            context.reason
        ))
    }
}

/// Parses the verification payload as plaintext JSON. A production codec
/// decrypts here first; failures are swallowed upstream either way.
pub(crate) struct PlainBlobCodec;

impl BlobCodec for PlainBlobCodec {
    fn decrypt(&self, blob: &str) -> Result<String, CodecError> {
        if blob.trim_start().starts_with('{') {
            Ok(blob.to_string())
        } else {
            Err(CodecError::Decrypt("payload is not recognizable".to_string()))
        }
    }
}

/// Extracts a requested amount from free text, supporting the "lakh"
/// shorthand. Shared by the intake and verification collaborators because
/// the routing dispatches the loan-intent message to the verification stage.
pub(crate) fn parse_amount(message: &str) -> Option<f64> {
    let lowered = message.to_lowercase();
    let value = lowered
        .split_whitespace()
        .filter_map(|token| {
            token
                .trim_matches(|c: char| !c.is_ascii_digit() && c != '.')
                .parse::<f64>()
                .ok()
        })
        .next()?;

    if lowered.contains("lakh") {
        Some(value * 100_000.0)
    } else {
        Some(value)
    }
}

/// Scripted intake collaborator serving small talk before loan intent shows
/// up in a message.
pub(crate) struct ScriptedSalesHandler;

impl SalesHandler for ScriptedSalesHandler {
    fn handle(&self, _state: &ConversationState, message: &str) -> Result<TurnDelta, HandlerError> {
        match parse_amount(message) {
            Some(amount) => Ok(TurnDelta {
                reply: format!(
                    "Great, I've noted a loan request of Rs. {amount:.0}. To proceed, please \
                     confirm your identity with your PAN or Aadhaar."
                ),
                loan: LoanDetails {
                    amount: Some(amount),
                    ..LoanDetails::default()
                },
                ..TurnDelta::default()
            }),
            None => Ok(TurnDelta::reply(
                "Welcome to LoanOps! I can help you with a personal loan. How much would you \
                 like to borrow?",
            )),
        }
    }
}

/// Scripted identity-check collaborator. It receives the loan-intent message
/// that triggered the move out of sales, so it also records the requested
/// amount before prompting for documents.
pub(crate) struct ScriptedVerificationHandler;

impl VerificationHandler for ScriptedVerificationHandler {
    fn handle(&self, state: &ConversationState, message: &str) -> Result<TurnDelta, HandlerError> {
        let mut delta = TurnDelta::reply(
            "To verify your identity, please share your PAN or Aadhaar number, or reply \
             'confirm' once you have submitted your documents.",
        );

        if state.loan.amount.is_none() {
            if let Some(amount) = parse_amount(message) {
                delta.loan.amount = Some(amount);
                delta.reply = format!(
                    "I've noted a loan request of Rs. {amount:.0}. To verify your identity, \
                     please share your PAN or Aadhaar number."
                );
            }
        }

        Ok(delta)
    }
}

pub(crate) fn default_policy_config() -> PolicyConfig {
    PolicyConfig::default()
}

pub(crate) fn build_supervisor(letter_dir: &str) -> Supervisor {
    let policy = default_policy_config();
    Supervisor::new(
        Arc::new(KeywordIntentDetector::default()),
        Arc::new(ScriptedSalesHandler),
        Arc::new(ScriptedVerificationHandler),
        UnderwritingEngine::new(
            Arc::new(MockCreditBureau),
            Arc::new(MockOfferMart),
            policy.clone(),
        ),
        SanctionPolicyGate::new(
            Arc::new(TextLetterRenderer::new(letter_dir)),
            Arc::new(TemplateExplanationService),
            Arc::new(PlainBlobCodec),
            policy,
        ),
    )
}
