pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod memory;
pub mod providers;

use serde::Serialize;
use switchyard_config::AppConfig;
use switchyard_orchestrator::Orchestrator;
use tracing::debug;

pub const DEFAULT_USER: &str = "local";

/// Load config and build the full pipeline from it.
pub async fn orchestrator() -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    debug!(
        registry = %config.registry_path().display(),
        memory = %config.memory_path().display(),
        "Configuration loaded"
    );
    let orchestrator = Orchestrator::from_config(&config)
        .await
        .map_err(|e| format!("Failed to start: {e}"))?;
    Ok(orchestrator)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First line of `text`, cut to `max` characters.
pub fn one_line(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max).collect();
    format!("{cut}…")
}
