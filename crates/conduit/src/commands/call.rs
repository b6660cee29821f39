//! Call command - invoke a single capability without an LLM.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;

use super::Context;

/// Arguments for the call command.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Capability name, as shown by `conduit tools`
    #[arg(required = true)]
    pub name: String,

    /// Arguments as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub args: String,
}

/// Run the call command.
pub fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let session = ctx.connect()?;
    let router = ctx.router(&session)?;

    let result = router.invoke_json(&session, &args.name, &args.args)?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&result.conversation_value())?);
    } else if result.is_success() {
        println!("{}", result.display_text());
    } else {
        let red = Style::new().red();
        eprintln!("{} {}", red.apply_to("Error:"), result);
    }

    if !result.is_success() {
        bail!("{} did not succeed: {}", args.name, result);
    }
    Ok(())
}
