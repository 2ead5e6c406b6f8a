//! Init command - interactive first-run setup.

use crate::cli::Output;
use crate::config::{Settings, VectorStoreProvider};
use console::style;
use std::io::{self, Write};

/// Run the init command for first-time setup.
pub fn run_init(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Advisor Setup");
    println!();
    println!("Welcome to Advisor! Let's make sure everything is configured correctly.\n");

    println!("{}", style("Step 1: Checking API keys").bold().cyan());
    println!();

    let missing = missing_keys(settings, |k| std::env::var(k).ok());
    if missing.is_empty() {
        Output::success("All required API keys are set!");
    } else {
        for key in &missing {
            Output::warning(&format!("{} is not set.", key));
            println!("  {}", style(format!("export {}='...'", key)).green());
        }
        println!();
        println!(
            "  Get an OpenAI key from: {}",
            style("https://platform.openai.com/api-keys").underlined()
        );
        println!();

        if !prompt_continue("Continue without them?")? {
            println!();
            Output::info("Setup cancelled. Set your API keys and run 'advisor init' again.");
            return Ok(());
        }
    }

    println!();

    println!("{}", style("Step 2: Setting up directories").bold().cyan());
    println!();

    for (label, dir) in [("Data", settings.data_dir()), ("Temp", settings.temp_dir())] {
        if dir.exists() {
            Output::info(&format!("{} directory exists: {}", label, dir.display()));
        } else {
            std::fs::create_dir_all(&dir)?;
            Output::success(&format!("Created {} directory: {}", label.to_lowercase(), dir.display()));
        }
    }

    println!();

    println!("{}", style("Step 3: Configuration file").bold().cyan());
    println!();

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!("Config file exists: {}", config_path.display()));
    } else if prompt_continue("Create default configuration file?")? {
        settings.save_to(&config_path)?;
        Output::success(&format!("Created config file: {}", config_path.display()));
        println!();
        println!("  Edit your config with: {}", style("advisor config edit").green());
    } else {
        Output::info("Skipped config file creation. Using defaults.");
    }

    println!();

    println!("{}", style("Setup Complete!").bold().green());
    println!();
    println!("Next steps:");
    println!("  {} Check system status", style("advisor doctor").cyan());
    println!("  {} Index your first document", style("advisor ingest <url>").cyan());
    println!("  {} Ask a question", style("advisor ask \"<question>\"").cyan());
    println!();
    println!("For more help: {}", style("advisor --help").cyan());

    Ok(())
}

/// API keys the configured backends need that are not set.
fn missing_keys<F>(settings: &Settings, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut required = vec!["OPENAI_API_KEY"];
    if settings.vector_store.provider == VectorStoreProvider::Pinecone {
        required.push("PINECONE_API_KEY");
    }

    required
        .into_iter()
        .filter(|key| lookup(key).map_or(true, |v| v.trim().is_empty()))
        .collect()
}

/// Prompt user for yes/no confirmation.
fn prompt_continue(message: &str) -> io::Result<bool> {
    print!("{} {} ", style("?").cyan(), message);
    print!("{} ", style("[y/N]").dim());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
