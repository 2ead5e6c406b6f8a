//! CLI module for Advisor.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Advisor - Academic Advisor RAG
///
/// Scrapes catalog pages and PDFs into a vector index and answers questions
/// grounded in them.
#[derive(Parser, Debug)]
#[command(name = "advisor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "ADVISOR_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Advisor and verify configuration
    Init,

    /// Check API keys, directories and the vector index
    Doctor,

    /// Scrape web pages or PDFs into a local snapshot of embedded chunks
    Scrape {
        /// URLs to scrape
        #[arg(required = true)]
        urls: Vec<String>,

        /// Snapshot file to write (defaults to the configured snapshot path)
        #[arg(short, long)]
        output: Option<String>,

        /// Upload the chunks to the vector store after writing the snapshot
        #[arg(long)]
        upload: bool,
    },

    /// Fetch, chunk, embed and index a single document
    Ingest {
        /// Web page or PDF URL
        url: String,

        /// Document title (PDFs default to the configured title)
        #[arg(short, long)]
        title: Option<String>,

        /// Re-process even if the catalog lists the document
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest a list of documents from a JSON or TOML file
    Batch {
        /// File with a list of {url, title} entries
        file: String,

        /// Re-process documents already in the catalog
        #[arg(short, long)]
        force: bool,
    },

    /// Upload a scraped snapshot to the vector store
    Upload {
        /// Snapshot file (defaults to the configured snapshot path)
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Ask a question and get an answer with sources
    Ask {
        /// The question to ask
        question: String,

        /// LLM model to use for response generation
        #[arg(short, long)]
        model: Option<String>,

        /// Number of context chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Custom system prompt
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Search for relevant chunks
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long, default_value = "0.0")]
        min_score: f32,
    },

    /// Start an interactive chat session
    Chat {
        /// LLM model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show whether the knowledge base is ready
    Status,

    /// Manage the vector index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Inspect the document catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Start the web UI and JSON API
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum IndexAction {
    /// Create the index if it does not exist
    Create,

    /// Show index statistics
    Stats,

    /// Delete the index and all its vectors
    Delete {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum CatalogAction {
    /// List catalog entries
    List,

    /// Show catalog totals
    Summary,

    /// Remove a document from the catalog
    Remove {
        /// Document URL
        url: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
