//! Configuration module for Advisor.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RagPrompts};
pub use settings::{
    CatalogSettings, ChunkingSettings, EmbeddingSettings, GeneralSettings, PdfSettings,
    PineconeSettings, PromptSettings, RagSettings, ScraperSettings, ServerSettings, Settings,
    SnapshotSettings, VectorStoreProvider, VectorStoreSettings,
};
