//! `switchyard config`: configuration management commands.

use std::path::Path;

use switchyard_config::{AppConfig, RegistryFile};

use super::print_json;

pub async fn show(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.model.api_key.is_some() {
        config.model.api_key = Some("[REDACTED]".into());
    }

    if json {
        return print_json(&config);
    }
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("# registry: {}", config.registry_path().display());
    println!("# memory:   {}", config.memory_path().display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let config_path = dir.join("config.toml");
    let written = write_defaults(&config_path, force)?;

    let config = AppConfig::load_from(&config_path)?;
    let registry_path = config.registry_path();
    let registry_written = write_example_registry(&registry_path, force)?;

    report(&config_path, written);
    report(&registry_path, registry_written);
    if !(written && registry_written) {
        println!("  Use --force to overwrite existing files.");
    }
    Ok(())
}

fn report(path: &Path, written: bool) {
    if written {
        println!("  wrote   {}", path.display());
    } else {
        println!("  kept    {}", path.display());
    }
}

/// Write the default config unless one exists. Returns whether it wrote.
pub fn write_defaults(path: &Path, force: bool) -> Result<bool, Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

/// Write the travel starter registry unless a registry exists.
pub fn write_example_registry(path: &Path, force: bool) -> Result<bool, Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Ok(false);
    }
    RegistryFile::example().save_to(path)?;
    Ok(true)
}
