//! Interactive chat command.

use super::rag_engine;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the interactive chat command.
pub async fn run_chat(model: Option<String>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'advisor doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings.clone())?;
    let mut engine = rag_engine(&settings, &orchestrator)?;
    if let Some(model) = model {
        engine = engine.with_model(&model);
    }

    println!("\n{}", style("Advisor Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to reset conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            let cleared = engine.history_len();
            engine.clear_history();
            Output::info(&format!("Conversation history cleared ({} messages).", cleared));
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = engine.chat(input).await;
        spinner.finish_and_clear();

        match result {
            Ok(response) => {
                println!(
                    "\n{} {}\n",
                    style("Advisor:").cyan().bold(),
                    response.format_for_display()
                );
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}
