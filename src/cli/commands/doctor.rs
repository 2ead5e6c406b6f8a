//! Doctor command - verify configuration and connectivity.

use crate::catalog::DocumentCatalog;
use crate::cli::Output;
use crate::config::{Settings, VectorStoreProvider};
use crate::orchestrator::{knowledge_base_status, KnowledgeBaseStatus};
use crate::vector_store::create_vector_store;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Advisor Doctor");
    println!();
    println!("Checking configuration and services...\n");

    let mut checks = Vec::new();

    println!("{}", style("API Keys").bold());
    let mut key_checks = vec![check_api_key("OPENAI_API_KEY", std::env::var("OPENAI_API_KEY").ok())];
    if settings.vector_store.provider == VectorStoreProvider::Pinecone {
        key_checks.push(check_api_key(
            "PINECONE_API_KEY",
            std::env::var("PINECONE_API_KEY").ok(),
        ));
    }
    for check in &key_checks {
        check.print();
    }
    let keys_ok = key_checks.iter().all(|c| c.status != CheckStatus::Error);
    checks.extend(key_checks);

    println!();

    println!("{}", style("Directories").bold());
    let dir_checks = check_directories(settings);
    for check in &dir_checks {
        check.print();
    }
    checks.extend(dir_checks);

    println!();

    println!("{}", style("Vector Store").bold());
    let store_check = if keys_ok {
        check_vector_store(settings).await
    } else {
        CheckResult::warning(
            settings.vector_store.provider.to_string().as_str(),
            "skipped",
            "Set the missing API keys first",
        )
    };
    store_check.print();
    checks.push(store_check);

    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file();
    config_check.print();
    checks.push(config_check);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Advisor.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Advisor is ready to use.");
    }

    Ok(())
}

/// Check that an API key is set, showing it masked.
fn check_api_key(name: &str, value: Option<String>) -> CheckResult {
    match value {
        Some(key) if key.trim().is_empty() => {
            CheckResult::error(name, "empty", &format!("Set with: export {}='...'", name))
        }
        Some(key) => CheckResult::ok(name, &format!("configured ({})", mask_key(&key))),
        None => CheckResult::error(name, "not set", &format!("Set with: export {}='...'", name)),
    }
}

/// Mask all but the first 7 and last 4 characters of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Check data directories and local state files.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let data_dir = settings.data_dir();
    if data_dir.exists() {
        results.push(CheckResult::ok("Data directory", &data_dir.display().to_string()));
    } else {
        results.push(CheckResult::warning(
            "Data directory",
            &format!("{} (will be created)", data_dir.display()),
            "Directory will be created on first use",
        ));
    }

    let catalog_path = settings.catalog_path();
    if catalog_path.exists() {
        let summary = DocumentCatalog::load(&catalog_path).summary();
        results.push(CheckResult::ok(
            "Catalog",
            &format!(
                "{} ({} documents)",
                catalog_path.display(),
                summary.total_documents
            ),
        ));
    } else {
        results.push(CheckResult::warning(
            "Catalog",
            &format!("{} (not created yet)", catalog_path.display()),
            "Created by the first 'advisor ingest' or 'advisor batch'",
        ));
    }

    if settings.vector_store.provider == VectorStoreProvider::Sqlite {
        let db_path = settings.sqlite_path();
        if db_path.exists() {
            let size = std::fs::metadata(&db_path)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "unknown size".to_string());
            results.push(CheckResult::ok(
                "Database",
                &format!("{} ({})", db_path.display(), size),
            ));
        } else {
            results.push(CheckResult::warning(
                "Database",
                &format!("{} (not created yet)", db_path.display()),
                "Database will be created on first ingest",
            ));
        }
    }

    results
}

/// Connect to the vector store and report index readiness.
async fn check_vector_store(settings: &Settings) -> CheckResult {
    let name = settings.vector_store.provider.to_string();
    let hint = "Check the vector store settings and API key";

    let store = match create_vector_store(settings) {
        Ok(store) => store,
        Err(e) => return CheckResult::error(&name, &e.to_string(), hint),
    };

    match knowledge_base_status(store.as_ref()).await {
        Ok(KnowledgeBaseStatus::Ready(count)) => {
            CheckResult::ok(&name, &format!("index ready ({} vectors)", count))
        }
        Ok(KnowledgeBaseStatus::Empty) => CheckResult::warning(
            &name,
            "index is empty",
            "Add documents with: advisor ingest <url>",
        ),
        Ok(KnowledgeBaseStatus::Missing) => CheckResult::warning(
            &name,
            "index does not exist",
            "Create it with: advisor index create",
        ),
        Err(e) => CheckResult::error(&name, &format!("unreachable: {}", e), hint),
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &config_path.display().to_string())
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: advisor init (or advisor config edit)",
        )
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_api_key_states() {
        assert_eq!(check_api_key("K", None).status, CheckStatus::Error);
        assert_eq!(check_api_key("K", Some(" ".to_string())).status, CheckStatus::Error);

        let ok = check_api_key("K", Some("sk-abcdefghijklmnop1234".to_string()));
        assert_eq!(ok.status, CheckStatus::Ok);
        assert!(ok.message.contains("sk-abcd...1234"));
    }

    #[test]
    fn test_mask_short_key() {
        assert_eq!(mask_key("abc"), "***");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[tokio::test]
    async fn test_memory_store_reports_missing_index() {
        let mut settings = Settings::default();
        settings.vector_store.provider = VectorStoreProvider::Memory;
        let check = check_vector_store(&settings).await;
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(check.message, "index does not exist");
    }
}
