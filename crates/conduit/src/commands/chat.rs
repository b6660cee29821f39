//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::repl::Repl;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// History key, when memory is enabled
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Override the tool-call round cap
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

/// Run the chat command (REPL).
pub fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let session = ctx.connect()?;
    let router = ctx.router(&session)?;
    let conversation = ctx.conversation(&args.session, args.max_iterations, true)?;

    let mut repl = Repl::new(session, router, conversation, ctx.verbose)?;
    repl.run()
}
