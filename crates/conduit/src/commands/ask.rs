//! Ask command - one-shot question to the agent.

use anyhow::Result;
use clap::Args;
use conduit_agent::{ConversationOutcome, LoopState};
use console::Style;
use serde_json::json;

use super::Context;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question or prompt to send
    #[arg(required = true)]
    pub prompt: String,

    /// History key, when memory is enabled
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Override the tool-call round cap
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

/// Run the ask command.
pub fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let session = ctx.connect()?;
    let router = ctx.router(&session)?;
    let conversation = ctx.conversation(&args.session, args.max_iterations, true)?;

    let history = conversation.stored_history();
    let outcome = conversation.run(&session, &router, &history, &args.prompt)?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
        return Ok(());
    }

    println!("{}", outcome.text);
    if ctx.verbose {
        let dim = Style::new().dim();
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "[{} tool round(s), {} LLM call(s)]",
                outcome.rounds, outcome.llm_calls
            ))
        );
    }
    Ok(())
}

fn outcome_json(outcome: &ConversationOutcome) -> serde_json::Value {
    json!({
        "state": match outcome.state {
            LoopState::Done => "done",
            LoopState::Incomplete => "incomplete",
            LoopState::AwaitingLlm | LoopState::AwaitingToolResults => "running",
        },
        "text": outcome.text,
        "rounds": outcome.rounds,
        "llm_calls": outcome.llm_calls,
    })
}
