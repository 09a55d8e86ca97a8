use super::conversation::ConversationState;

/// Session persistence abstraction. The caller owns the state lifecycle:
/// load before a turn, persist after. Turn-level serialization per session is
/// the host's contract, not this trait's.
pub trait SessionStore: Send + Sync {
    fn fetch(&self, session_id: &str) -> Result<Option<ConversationState>, SessionStoreError>;
    fn upsert(&self, state: ConversationState) -> Result<(), SessionStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}
