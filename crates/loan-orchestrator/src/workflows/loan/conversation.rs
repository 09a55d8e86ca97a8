use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One node of the fixed five-state application lifecycle.
///
/// `Sanction` and `Rejected` are terminal; no routing rule transitions out of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Sales,
    Verification,
    Underwriting,
    Sanction,
    Rejected,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Sales => "sales",
            Stage::Verification => "verification",
            Stage::Underwriting => "underwriting",
            Stage::Sanction => "sanction",
            Stage::Rejected => "rejected",
        }
    }

    /// The handler bound 1:1 to this stage. Derived, never set independently.
    pub fn agent(self) -> AgentKind {
        match self {
            Stage::Sales => AgentKind::SalesAgent,
            Stage::Verification => AgentKind::VerificationAgent,
            Stage::Underwriting => AgentKind::UnderwritingAgent,
            Stage::Sanction | Stage::Rejected => AgentKind::SanctionAgent,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Sanction | Stage::Rejected)
    }
}

/// Identifier of the handler serving the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentKind {
    #[default]
    SalesAgent,
    VerificationAgent,
    UnderwritingAgent,
    SanctionAgent,
}

impl AgentKind {
    pub fn label(self) -> &'static str {
        match self {
            AgentKind::SalesAgent => "SalesAgent",
            AgentKind::VerificationAgent => "VerificationAgent",
            AgentKind::UnderwritingAgent => "UnderwritingAgent",
            AgentKind::SanctionAgent => "SanctionAgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One exchanged turn. Append-only; insertion order is significant for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub role: MessageRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl MessageEntry {
    pub fn now(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Facts collected about the applicant over the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub monthly_salary: Option<f64>,
    /// Encrypted verification payload handed over by the identity check;
    /// decrypted best-effort to enrich the sanction letter.
    pub verification_blob: Option<String>,
}

/// Facts collected about the requested loan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanDetails {
    pub amount: Option<f64>,
    pub tenure_months: Option<u16>,
    pub interest_rate: Option<f64>,
    pub expected_emi: Option<f64>,
}

impl LoanDetails {
    /// Overlay collected fields onto this record; `None` leaves a field alone.
    pub fn merge(&mut self, other: &LoanDetails) {
        if other.amount.is_some() {
            self.amount = other.amount;
        }
        if other.tenure_months.is_some() {
            self.tenure_months = other.tenure_months;
        }
        if other.interest_rate.is_some() {
            self.interest_rate = other.interest_rate;
        }
        if other.expected_emi.is_some() {
            self.expected_emi = other.expected_emi;
        }
    }
}

impl ApplicantDetails {
    pub fn merge(&mut self, other: &ApplicantDetails) {
        if other.customer_id.is_some() {
            self.customer_id = other.customer_id.clone();
        }
        if other.customer_name.is_some() {
            self.customer_name = other.customer_name.clone();
        }
        if other.monthly_salary.is_some() {
            self.monthly_salary = other.monthly_salary;
        }
        if other.verification_blob.is_some() {
            self.verification_blob = other.verification_blob.clone();
        }
    }
}

/// Eligibility verdict recorded after underwriting; drives the same-turn
/// re-route to a terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderwritingDecision {
    Approved,
    Rejected,
}

impl UnderwritingDecision {
    pub fn label(self) -> &'static str {
        match self {
            UnderwritingDecision::Approved => "approved",
            UnderwritingDecision::Rejected => "rejected",
        }
    }
}

/// How a finalized sanction decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanctionDecisionType {
    #[serde(rename = "AUTOMATED")]
    Automated,
    #[serde(rename = "HUMAN_REVIEW")]
    HumanReview,
}

impl SanctionDecisionType {
    pub fn label(self) -> &'static str {
        match self {
            SanctionDecisionType::Automated => "AUTOMATED",
            SanctionDecisionType::HumanReview => "HUMAN_REVIEW",
        }
    }
}

/// Decision metadata written once a sanction decision is made; immutable for
/// the rest of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    pub decision_type: SanctionDecisionType,
    pub decision_source: String,
    pub decision_reason: String,
    pub policy_applied: String,
    pub decided_at: DateTime<Utc>,
}

/// Full conversation state for one session.
///
/// Owned exclusively by the supervisor for the duration of a turn; persisted
/// across turns in the host's session store. The host must serialize turns
/// per session, since the state merge is non-atomic across the two dispatch
/// passes of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub stage: Stage,
    pub active_agent: AgentKind,
    pub messages: Vec<MessageEntry>,
    pub applicant: ApplicantDetails,
    pub loan: LoanDetails,
    pub verified: bool,
    pub underwriting_decision: Option<UnderwritingDecision>,
    pub decision: Option<DecisionMetadata>,
    pub sanction_letter: Option<String>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            stage: Stage::default(),
            active_agent: Stage::default().agent(),
            messages: Vec::new(),
            applicant: ApplicantDetails::default(),
            loan: LoanDetails::default(),
            verified: false,
            underwriting_decision: None,
            decision: None,
            sanction_letter: None,
        }
    }

    /// Commit a handler delta. Decision metadata is write-once: a delta
    /// carrying metadata against an already-decided session is ignored.
    pub fn apply(&mut self, delta: &TurnDelta) {
        self.loan.merge(&delta.loan);
        self.applicant.merge(&delta.applicant);
        if let Some(verified) = delta.verified {
            self.verified = verified;
        }
        if delta.underwriting_decision.is_some() {
            self.underwriting_decision = delta.underwriting_decision;
        }
        if self.decision.is_none() {
            self.decision = delta.decision.clone();
        }
        if delta.sanction_letter.is_some() {
            self.sanction_letter = delta.sanction_letter.clone();
        }
    }

    pub fn push_message(&mut self, role: MessageRole, text: impl Into<String>) {
        self.messages.push(MessageEntry::now(role, text));
    }

    /// Sanitized projection exposed over the status endpoint.
    pub fn status_view(&self) -> ConversationStateView {
        ConversationStateView {
            session_id: self.session_id.clone(),
            stage: self.stage.label(),
            active_agent: self.active_agent.label(),
            verified: self.verified,
            message_count: self.messages.len(),
            underwriting_decision: self.underwriting_decision.map(UnderwritingDecision::label),
            decision: self.decision.clone(),
            sanction_letter: self.sanction_letter.clone(),
        }
    }
}

/// Immutable result of one handler dispatch. Handlers never touch
/// [`ConversationState`] directly; the supervisor applies at most two deltas
/// per turn and commits once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnDelta {
    pub reply: String,
    pub loan: LoanDetails,
    pub applicant: ApplicantDetails,
    pub verified: Option<bool>,
    pub underwriting_decision: Option<UnderwritingDecision>,
    pub decision: Option<DecisionMetadata>,
    pub sanction_letter: Option<String>,
}

impl TurnDelta {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            ..Self::default()
        }
    }
}

/// What the caller gets back from one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub reply: String,
    pub stage: Stage,
    pub active_agent: AgentKind,
}

/// Sanitized representation of a session's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStateView {
    pub session_id: String,
    pub stage: &'static str,
    pub active_agent: &'static str,
    pub verified: bool,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underwriting_decision: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanction_letter: Option<String>,
}

/// Renders a monetary amount with 3-digit thousands grouping (`150,000`),
/// matching the letter and reply templates.
pub(crate) fn format_amount(value: f64) -> String {
    let negative = value < 0.0;
    let whole = value.abs().round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}
