use crate::infra::build_supervisor;
use clap::Args;
use loan_orchestrator::error::AppError;
use loan_orchestrator::workflows::loan::ConversationState;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Customer identifier used against the seeded bureau data (1, 2, or 3)
    #[arg(long, default_value = "1")]
    pub(crate) customer: String,
    /// Requested loan amount
    #[arg(long, default_value_t = 40_000.0)]
    pub(crate) amount: f64,
    /// Directory where generated sanction letters are written
    #[arg(long, default_value = "generated")]
    pub(crate) letter_dir: String,
}

/// Drives one scripted conversation through every stage and prints the
/// orchestrator's replies, matching what the HTTP surface would return.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let supervisor = build_supervisor(&args.letter_dir);
    let mut state = ConversationState::new(format!("demo-{}", args.customer));
    state.applicant.customer_id = Some(args.customer.clone());

    let script = [
        "Hi there!".to_string(),
        format!("I want a loan of {} rupees", args.amount),
        "Yes, please proceed. My PAN is on file.".to_string(),
    ];

    println!("=== Loan orchestrator demo (customer {}) ===", args.customer);
    for message in &script {
        let turn = supervisor.handle_turn(&mut state, message);
        println!();
        println!("user > {message}");
        println!(
            "[{} / {}]",
            turn.stage.label(),
            turn.active_agent.label()
        );
        println!("bot  > {}", turn.reply);
    }

    println!();
    println!("=== Final session status ===");
    let view = state.status_view();
    println!(
        "stage: {} | agent: {} | verified: {}",
        view.stage, view.active_agent, view.verified
    );
    if let Some(decision) = &view.decision {
        println!(
            "decision: {} ({})",
            decision.decision_type.label(),
            decision.decision_reason
        );
    }
    if let Some(letter) = &view.sanction_letter {
        println!("sanction letter: {letter}");
    }

    Ok(())
}
