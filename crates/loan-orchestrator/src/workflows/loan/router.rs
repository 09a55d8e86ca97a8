use super::conversation::{ConversationState, Stage, UnderwritingDecision};

/// Routing signal derived from one user message.
///
/// The router itself never inspects message text; producing the signal is the
/// detector's job, so a learned classifier can replace the keyword matcher
/// without touching the routing rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentSignal {
    pub loan_interest: bool,
    pub identity_confirmation: bool,
}

pub trait IntentDetector: Send + Sync {
    fn detect(&self, message: &str) -> IntentSignal;
}

/// Fixed keyword-set detector. Case-insensitive substring match against the
/// trigger vocabularies for loan interest and identity confirmation.
#[derive(Debug, Clone)]
pub struct KeywordIntentDetector {
    loan_markers: Vec<&'static str>,
    identity_markers: Vec<&'static str>,
}

impl Default for KeywordIntentDetector {
    fn default() -> Self {
        Self {
            loan_markers: vec![
                "loan", "lakh", "amount", "borrow", "need", "want", "rupees", "₹",
            ],
            identity_markers: vec![
                "pan", "aadhaar", "verified", "confirm", "yes", "proceed", "id",
            ],
        }
    }
}

impl IntentDetector for KeywordIntentDetector {
    fn detect(&self, message: &str) -> IntentSignal {
        let lowered = message.to_lowercase();
        IntentSignal {
            loan_interest: self
                .loan_markers
                .iter()
                .any(|marker| lowered.contains(marker)),
            identity_confirmation: self
                .identity_markers
                .iter()
                .any(|marker| lowered.contains(marker)),
        }
    }
}

/// Pure, total, deterministic stage transition function.
///
/// `Underwriting` ignores the signal entirely and transitions on the recorded
/// eligibility decision; terminal stages always self-transition.
pub fn next_stage(current: Stage, state: &ConversationState, signal: &IntentSignal) -> Stage {
    if current.is_terminal() {
        return current;
    }

    match current {
        Stage::Sales => {
            if signal.loan_interest {
                Stage::Verification
            } else {
                Stage::Sales
            }
        }
        Stage::Verification => {
            if signal.identity_confirmation {
                Stage::Underwriting
            } else {
                Stage::Verification
            }
        }
        Stage::Underwriting => match state.underwriting_decision {
            Some(UnderwritingDecision::Approved) => Stage::Sanction,
            Some(UnderwritingDecision::Rejected) => Stage::Rejected,
            None => Stage::Underwriting,
        },
        Stage::Sanction | Stage::Rejected => current,
    }
}
