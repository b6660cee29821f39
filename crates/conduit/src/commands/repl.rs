//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use anyhow::Result;
use conduit_agent::{AgentError, ConversationLoop, LoopState, Message};
use conduit_mcp::{InvocationRouter, McpSession};
use console::{Style, Term, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

/// REPL state and configuration.
pub struct Repl {
    session: McpSession,
    router: InvocationRouter,
    conversation: ConversationLoop,
    /// Context for the next run: stored turns loaded at startup, then the
    /// completed exchanges of this chat.
    history: Vec<Message>,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

/// What to do after a slash command.
enum ControlFlow {
    Continue,
    Exit,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(
        session: McpSession,
        router: InvocationRouter,
        conversation: ConversationLoop,
        verbose: bool,
    ) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;
        let history = conversation.stored_history();
        tracing::debug!(messages = history.len(), "chat history loaded");

        Ok(Self {
            session,
            router,
            conversation,
            history,
            editor,
            term: Term::stdout(),
            verbose,
        })
    }

    /// Run the REPL loop.
    pub fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            match self.editor.readline("conduit> ") {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    if line.starts_with('/') {
                        match self.handle_slash_command(line) {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    if let Err(e) = self.send_message(line) {
                        self.print_error(&format!("Error: {}", e));
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    /// Run one user message through the conversation loop.
    fn send_message(&mut self, message: &str) -> Result<()> {
        let outcome = match self
            .conversation
            .run(&self.session, &self.router, &self.history, message)
        {
            Ok(outcome) => outcome,
            Err(AgentError::Mcp(e)) if e.is_session_expired() => {
                self.print_error(&e.to_string());
                self.reinitialize()?;
                self.print_dim("Session re-established. Please send your message again.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        println!();
        println!("{}", outcome.text);
        println!();

        match outcome.state {
            LoopState::Done => {
                self.history.push(Message::user(message));
                self.history.push(Message::assistant(&outcome.text));
            }
            _ => self.print_dim("(No final answer; this exchange is not kept in context)"),
        }

        if self.verbose {
            self.print_dim(&format!(
                "[{} tool round(s), {} LLM call(s)]",
                outcome.rounds, outcome.llm_calls
            ));
        }
        Ok(())
    }

    fn reinitialize(&self) -> Result<()> {
        let id = self.session.initialize()?;
        tracing::info!(session_id = ?id, "MCP session re-initialized");
        Ok(())
    }

    /// Handle a slash command.
    fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let cmd = input[1..].split_whitespace().next().unwrap_or("");

        match cmd {
            "quit" | "q" | "exit" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "tools" => {
                self.print_tools();
            }
            "reset" => {
                self.history.clear();
                self.reinitialize()?;
                self.print_dim("Conversation cleared and session re-established");
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Conduit Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to(format!(
                "Connected to {} with {} capabilities.",
                self.session.endpoint(),
                self.router.catalog().len()
            ))
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - List tools and resources", style("/tools").cyan());
        println!(
            "  {}  - Forget this conversation and re-initialize the session",
            style("/reset").cyan()
        );
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!();
    }

    fn print_tools(&self) {
        let dim = Style::new().dim();
        for descriptor in self.router.catalog().descriptors() {
            println!(
                "  {}  {}",
                style(&descriptor.name).cyan(),
                dim.apply_to(&descriptor.description)
            );
        }
    }

    fn print_dim(&self, msg: &str) {
        println!("{}", Style::new().dim().apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        eprintln!("{}", style(msg).red());
    }
}
