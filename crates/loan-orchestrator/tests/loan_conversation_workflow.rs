//! End-to-end specifications for the loan conversation workflow, driven
//! through the public supervisor facade and the HTTP router so routing,
//! underwriting, sanctioning, and the rationale projection are validated
//! together.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use loan_orchestrator::config::PolicyConfig;
    use loan_orchestrator::workflows::loan::{
        BlobCodec, CodecError, ConversationState, CreditLookup, DecisionContext, ExplanationError,
        ExplanationService, HandlerError, IntentDetector, KeywordIntentDetector, LetterArtifact,
        LetterRenderer, LimitLookup, LoanDetails, LookupError, RenderError, SalesHandler,
        SanctionLetterDetails, SanctionPolicyGate, SessionStore, SessionStoreError, Supervisor,
        TurnDelta, UnderwritingEngine, VerificationHandler,
    };

    /// Mock bureau mirroring the demo dataset; unknown customers get 650.
    pub struct MockCreditBureau;

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

    /// Mock offer mart; unknown customers get 100,000.
    pub struct MockOfferMart;

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

    pub struct StubRenderer;

    impl LetterRenderer for StubRenderer {
        fn render(&self, details: &SanctionLetterDetails) -> Result<LetterArtifact, RenderError> {
            Ok(LetterArtifact {
                file: format!("sanction_{}.txt", details.session_id),
            })
        }
    }

    pub struct StubExplainer;

    impl ExplanationService for StubExplainer {
        fn narrate(&self, _context: &DecisionContext) -> Result<String, ExplanationError> {
            Ok("Congratulations! Your loan application has been approved.".to_string())
        }
    }

    pub struct PassthroughCodec;

    impl BlobCodec for PassthroughCodec {
        fn decrypt(&self, blob: &str) -> Result<String, CodecError> {
            Ok(blob.to_string())
        }
    }

    pub struct GreetingSales;

    impl SalesHandler for GreetingSales {
        fn handle(
            &self,
            _state: &ConversationState,
            _message: &str,
        ) -> Result<TurnDelta, HandlerError> {
            Ok(TurnDelta::reply("How much would you like to borrow?"))
        }
    }

    /// Identity-check collaborator. The loan-intent message is dispatched
    /// here (routing advances before dispatch), so it captures the requested
    /// amount and pins the seeded demo customer profile.
    pub struct CapturingVerification;

    impl VerificationHandler for CapturingVerification {
        fn handle(
            &self,
            state: &ConversationState,
            message: &str,
        ) -> Result<TurnDelta, HandlerError> {
            let amount = message
                .split_whitespace()
                .filter_map(|token| {
                    token
                        .trim_matches(|c: char| !c.is_ascii_digit())
                        .parse::<f64>()
                        .ok()
                })
                .next();

            let mut delta = TurnDelta::reply(
                "Please share your PAN or Aadhaar to verify your identity.",
            );
            if state.loan.amount.is_none() {
                delta.loan = LoanDetails {
                    amount,
                    ..LoanDetails::default()
                };
            }
            if state.applicant.customer_id.is_none() {
                delta.applicant.customer_id = Some("1".to_string());
            }
            Ok(delta)
        }
    }

    #[derive(Default)]
    pub struct InMemorySessionStore {
        sessions: Mutex<HashMap<String, ConversationState>>,
    }

    impl SessionStore for InMemorySessionStore {
        fn fetch(&self, session_id: &str) -> Result<Option<ConversationState>, SessionStoreError> {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| SessionStoreError::Unavailable("poisoned".to_string()))?;
            Ok(sessions.get(session_id).cloned())
        }

        fn upsert(&self, state: ConversationState) -> Result<(), SessionStoreError> {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| SessionStoreError::Unavailable("poisoned".to_string()))?;
            sessions.insert(state.session_id.clone(), state);
            Ok(())
        }
    }

    pub fn detector() -> Arc<dyn IntentDetector> {
        Arc::new(KeywordIntentDetector::default())
    }

    pub fn supervisor() -> Supervisor {
        let policy = PolicyConfig::default();
        Supervisor::new(
            detector(),
            Arc::new(GreetingSales),
            Arc::new(CapturingVerification),
            UnderwritingEngine::new(
                Arc::new(MockCreditBureau),
                Arc::new(MockOfferMart),
                policy.clone(),
            ),
            SanctionPolicyGate::new(
                Arc::new(StubRenderer),
                Arc::new(StubExplainer),
                Arc::new(PassthroughCodec),
                policy,
            ),
        )
    }
}

mod conversations {
    use super::common;
    use loan_orchestrator::workflows::loan::{
        ConversationState, SanctionDecisionType, Stage, UnderwritingDecision,
    };

    #[test]
    fn full_journey_small_loan_ends_in_automated_sanction() {
        let supervisor = common::supervisor();
        let mut state = ConversationState::new("journey-auto");
        state.applicant.customer_id = Some("1".to_string());
        state.loan.expected_emi = Some(2_100.0);

        let turn = supervisor.handle_turn(&mut state, "I want to borrow 40000 rupees");
        assert_eq!(turn.stage, Stage::Verification);

        let turn = supervisor.handle_turn(&mut state, "yes, my PAN is attached");
        assert_eq!(turn.stage, Stage::Sanction);
        assert!(state.verified);
        assert_eq!(
            state.underwriting_decision,
            Some(UnderwritingDecision::Approved)
        );
        let decision = state.decision.as_ref().expect("decision written");
        assert_eq!(decision.decision_type, SanctionDecisionType::Automated);
        assert_eq!(
            state.sanction_letter.as_deref(),
            Some("sanction_journey-auto.txt")
        );
        assert!(turn.reply.contains("approved"));
    }

    #[test]
    fn full_journey_large_loan_ends_in_human_review() {
        let supervisor = common::supervisor();
        let mut state = ConversationState::new("journey-review");
        state.applicant.customer_id = Some("1".to_string());

        supervisor.handle_turn(&mut state, "I need 80000 for renovations");
        let turn = supervisor.handle_turn(&mut state, "proceed, aadhaar shared");

        assert_eq!(turn.stage, Stage::Sanction);
        let decision = state.decision.as_ref().expect("decision written");
        assert_eq!(decision.decision_type, SanctionDecisionType::HumanReview);
        assert!(turn.reply.contains("manual review"));
    }

    #[test]
    fn low_score_customer_is_rejected_despite_small_amount() {
        let supervisor = common::supervisor();
        let mut state = ConversationState::new("journey-reject");
        state.applicant.customer_id = Some("2".to_string());

        supervisor.handle_turn(&mut state, "loan of 50000 please");
        let turn = supervisor.handle_turn(&mut state, "confirm");

        assert_eq!(turn.stage, Stage::Rejected);
        assert_eq!(
            state.underwriting_decision,
            Some(UnderwritingDecision::Rejected)
        );

        // Terminal: any later message self-transitions.
        let turn = supervisor.handle_turn(&mut state, "I really need this loan");
        assert_eq!(turn.stage, Stage::Rejected);
    }
}

mod http {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::common;
    use loan_orchestrator::workflows::loan::conversation_router;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    fn chat_request(session_id: &str, message: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/loan/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "session_id": session_id, "message": message }).to_string(),
            ))
            .expect("request builds")
    }

    #[tokio::test]
    async fn chat_endpoint_drives_a_session_and_exposes_status() {
        let store = Arc::new(common::InMemorySessionStore::default());
        let app = conversation_router(Arc::new(common::supervisor()), store);

        let response = app
            .clone()
            .oneshot(chat_request("http-1", "I want a loan of 40000"))
            .await
            .expect("chat call succeeds");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["stage"], "verification");
        assert_eq!(body["active_agent"], "VerificationAgent");

        let response = app
            .clone()
            .oneshot(chat_request("http-1", "yes, PAN attached"))
            .await
            .expect("chat call succeeds");
        let body = body_json(response).await;
        assert_eq!(body["stage"], "sanction");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/loan/sessions/http-1")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("status call succeeds");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["stage"], "sanction");
        assert_eq!(body["verified"], true);
        assert_eq!(body["decision"]["decision_type"], "AUTOMATED");
        assert_eq!(body["rationale"]["decision"], "APPROVED");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_turns_for_one_session_are_serialized() {
        let store = Arc::new(common::InMemorySessionStore::default());
        let app = conversation_router(Arc::new(common::supervisor()), store);

        // Each turn appends one user and one assistant message. If two turns
        // interleaved, one would fetch a stale snapshot and its upsert would
        // drop the other's writes.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                app.oneshot(chat_request("http-parallel", "good morning"))
                    .await
                    .expect("chat call succeeds")
                    .status()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("task joins"), StatusCode::OK);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/loan/sessions/http-parallel")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("status call succeeds");
        let body = body_json(response).await;
        assert_eq!(body["message_count"], 16);
    }

    #[tokio::test]
    async fn unknown_session_status_returns_not_found() {
        let store = Arc::new(common::InMemorySessionStore::default());
        let app = conversation_router(Arc::new(common::supervisor()), store);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/loan/sessions/missing")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("status call succeeds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
