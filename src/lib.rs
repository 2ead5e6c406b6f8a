//! Advisor - Academic Advisor RAG
//!
//! A CLI tool and small web app that turns catalog web pages and PDFs into a
//! searchable knowledge base and answers questions grounded in it.
//!
//! # Overview
//!
//! Advisor allows you to:
//! - Scrape web pages and download PDFs
//! - Split their text into overlapping chunks and embed them with OpenAI
//! - Store the embeddings in Pinecone (or a local SQLite file)
//! - Ask questions and get answers with citations
//!
//! # Architecture
//!
//! - `config` - Settings, environment overrides and prompt templates
//! - `source` - Web page scraping and PDF text extraction
//! - `chunking` - Recursive character text splitting
//! - `embedding` - Embedding generation
//! - `vector_store` - Vector database abstraction
//! - `catalog` - Record of processed documents
//! - `snapshot` - Local file of embedded chunks awaiting upload
//! - `rag` - Retrieval and answer generation
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use advisor::config::Settings;
//! use advisor::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let result = orchestrator
//!         .process_document("https://catalog.example.edu/econ", Some("Economics"), false)
//!         .await?;
//!     println!("Indexed {} chunks", result.chunks_indexed);
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod snapshot;
pub mod source;
pub mod vector_store;

pub use error::{AdvisorError, Result};
