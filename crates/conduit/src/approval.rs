//! Terminal approval prompt.

use std::io;

use conduit_mcp::{ApprovalDecision, ApprovalHandler, ApprovalRequest, McpError};
use console::{Style, Term, style};

/// Answers left unparsable this many times count as a cancel.
const MAX_ATTEMPTS: usize = 3;

type ReadLine = dyn Fn() -> io::Result<String> + Send + Sync;

/// Asks on stderr and reads the answer from the terminal.
pub struct ConsoleApprovalHandler {
    read_line: Box<ReadLine>,
}

impl ConsoleApprovalHandler {
    pub fn new() -> Self {
        Self::with_input(|| Term::stderr().read_line())
    }

    /// Read answers from `read_line` instead of the terminal.
    pub fn with_input(read_line: impl Fn() -> io::Result<String> + Send + Sync + 'static) -> Self {
        Self {
            read_line: Box::new(read_line),
        }
    }

    fn show(&self, request: &ApprovalRequest) {
        let dim = Style::new().dim();
        let args = serde_json::to_string_pretty(&request.arguments)
            .unwrap_or_else(|_| request.arguments.to_string());
        eprintln!();
        eprintln!("{} {}", style("Approval required:").yellow().bold(), request.prompt);
        eprintln!("{}", dim.apply_to(format!("  operation: {}", request.operation)));
        for line in args.lines() {
            eprintln!("{}", dim.apply_to(format!("  {line}")));
        }
    }
}

impl Default for ConsoleApprovalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalHandler for ConsoleApprovalHandler {
    fn decide(&self, request: &ApprovalRequest) -> conduit_mcp::Result<ApprovalDecision> {
        self.show(request);

        for _ in 0..MAX_ATTEMPTS {
            eprint!("{} ", style("[a]ccept / [d]ecline / [c]ancel >").cyan());
            let answer = (self.read_line)()
                .map_err(|e| McpError::approval(format!("failed to read answer: {e}")))?;

            // Closed input.
            if answer.trim().is_empty() {
                return Ok(ApprovalDecision::Cancel);
            }
            match answer.parse::<ApprovalDecision>() {
                Ok(decision) => {
                    tracing::info!(operation = %request.operation, %decision, "approval answered");
                    return Ok(decision);
                }
                Err(e) => eprintln!("{}", style(e).red()),
            }
        }
        Ok(ApprovalDecision::Cancel)
    }
}
