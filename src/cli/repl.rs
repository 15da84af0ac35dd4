//! Line-oriented chat loop over stdin.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use super::args::Args;
use crate::agent::{extract_commands, validate_sequence, AgentSession, CommandGate};
use crate::ai::create_provider;
use crate::executor::LocalExecutor;
use crate::models::error::{AgentError, Result};

const HELP: &str = "Commands: /reset clears the conversation, /history shows it, /exit quits. Ctrl-C stops a reply, or quits at the prompt.";

/// Interactive session bound to stdin and stdout
pub struct Repl {
    session: AgentSession,
    gate: CommandGate,
    input: Lines<BufReader<Stdin>>,
}

impl Repl {
    pub fn new(session: AgentSession, gate: CommandGate) -> Self {
        Self {
            session,
            gate,
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Answer the initial query if any, then read questions until EOF or `/exit`
    pub async fn run(&mut self, initial_query: Option<String>) -> Result<()> {
        println!(
            "howai ({} / {})\n{}",
            self.session.provider_type(),
            self.session.model_name(),
            HELP
        );

        if let Some(query) = initial_query {
            println!("> {}", query);
            self.handle_query(&query).await?;
        }

        loop {
            let Some(line) = self.prompt("> ").await? else {
                break;
            };

            match line.trim() {
                "" => continue,
                "/exit" | "/quit" => break,
                "/help" => println!("{}", HELP),
                "/reset" => match self.session.reset().await {
                    Ok(()) => println!("Conversation cleared."),
                    Err(e) => report(&e),
                },
                "/history" => {
                    for message in self.session.history().await {
                        println!("[{}] {}", message.role, message.content);
                    }
                }
                query => self.handle_query(query).await?,
            }
        }

        Ok(())
    }

    async fn handle_query(&mut self, query: &str) -> Result<()> {
        let mut stream = match self.session.ask(query).await {
            Ok(stream) => stream,
            Err(e) => {
                report(&e);
                return Ok(());
            }
        };
        let cancel = stream.cancellation_token();

        loop {
            tokio::select! {
                chunk = stream.recv() => match chunk {
                    Some(chunk) if chunk.is_final => break,
                    Some(chunk) => {
                        print!("{}", chunk.content);
                        flush_stdout()?;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        }
        println!();

        match stream.finish().await {
            Ok(reply) => self.offer_commands(&reply).await,
            Err(AgentError::Cancelled) => {
                println!("(cancelled)");
                Ok(())
            }
            Err(e) => {
                report(&e);
                Ok(())
            }
        }
    }

    /// Preview each extracted command and run the ones the user confirms
    async fn offer_commands(&mut self, reply: &str) -> Result<()> {
        let commands = extract_commands(reply);
        if commands.is_empty() {
            return Ok(());
        }

        if !validate_sequence(&commands) {
            println!(
                "\nWarning: the suggested commands create a file and then run it; they will not be offered for execution."
            );
            return Ok(());
        }

        for command in commands {
            println!("\n{}", command.preview());

            if !self.confirm("Run this command? [y/N] ").await? {
                println!("Skipped.");
                continue;
            }

            let result = self.gate.execute(command).await;
            println!("\n{}\n", result.to_markdown());
        }

        Ok(())
    }

    async fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.prompt(question).await?.unwrap_or_default();
        Ok(is_yes(&answer))
    }

    async fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        print!("{}", text);
        flush_stdout()?;
        let line = read_line(&mut self.input, tokio::signal::ctrl_c()).await?;
        if line.is_none() {
            println!();
        }
        Ok(line)
    }
}

/// Build the session and gate from the arguments and run the loop
pub async fn run(args: Args) -> Result<()> {
    let settings = args.settings()?;
    let model = create_provider(&settings)?;

    let mut gate = CommandGate::new(Arc::new(LocalExecutor::new()));
    if let Some(secs) = settings.command_timeout_secs {
        gate = gate.with_timeout(Duration::from_secs(secs));
    }

    let mut repl = Repl::new(AgentSession::new(model), gate);
    repl.run(args.initial_query()).await
}

/// Next input line; `None` on EOF or when `interrupt` fires first
async fn read_line<R, F>(input: &mut Lines<R>, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = input.next_line() => {
            line.map_err(|e| AgentError::Internal(format!("Failed to read input: {}", e)))
        }
        _ = interrupt => Ok(None),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn flush_stdout() -> Result<()> {
    std::io::stdout()
        .flush()
        .map_err(|e| AgentError::Internal(format!("Failed to write output: {}", e)))
}

fn report(err: &AgentError) {
    eprintln!("Error: {}\n{}", err, err.recovery_suggestion());
}
