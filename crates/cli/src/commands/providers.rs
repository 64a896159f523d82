//! `switchyard providers`: registry inspection and maintenance.

use switchyard_registry::{ProviderInfo, ValidationReport};

use super::{orchestrator, print_json};

pub async fn list(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let registry = orchestrator.registry();
    let infos: Vec<ProviderInfo> = registry
        .get_all()
        .iter()
        .filter_map(|h| registry.provider_info(h.id()))
        .collect();

    if json {
        return print_json(&infos);
    }

    if let Some(path) = registry.path() {
        println!("Registry: {}", path.display());
    }
    if infos.is_empty() {
        println!("No providers loaded. Run `switchyard config init` to write an example registry.");
        return Ok(());
    }

    let fallback = registry.fallback().map(|h| h.id().to_string());
    println!();
    println!("  {:<18} {:>3}  {:<40} {:>5} {:>6} {:>8}", "ID", "PRI", "CAPABILITIES", "RUNS", "OK%", "AVG ms");
    for info in &infos {
        let marker = if fallback.as_deref() == Some(info.descriptor.id.as_str()) { "*" } else { " " };
        println!(
            "{marker} {:<18} {:>3}  {:<40} {:>5} {:>5.0}% {:>8.0}",
            info.descriptor.id,
            info.descriptor.priority,
            info.capabilities.join(", "),
            info.executions,
            info.success_rate * 100.0,
            info.average_latency_ms,
        );
    }
    println!();
    println!("  * fallback provider");

    let skipped: Vec<String> = registry
        .descriptors()
        .into_iter()
        .filter(|d| registry.get(&d.id).is_none())
        .map(|d| d.id)
        .collect();
    if !skipped.is_empty() {
        println!("  not loaded: {}", skipped.join(", "));
    }
    Ok(())
}

pub async fn validate(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let report = orchestrator.registry().validate();

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.valid {
        Ok(())
    } else {
        Err(format!("{} registry error(s)", report.errors.len()).into())
    }
}

fn print_report(report: &ValidationReport) {
    println!("Validating provider registry...");
    for check in &report.providers {
        let status = if !check.enabled {
            "skip"
        } else if check.passed() {
            " ok "
        } else {
            "FAIL"
        };
        println!("  [{status}] {}", check.id);
        for issue in &check.issues {
            println!("         {issue}");
        }
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    println!();
    if report.valid {
        println!("  All checks passed");
    }
}

pub async fn reload(id: Option<&str>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let registry = orchestrator.registry();

    if let Some(id) = id {
        registry.reload(id)?;
        if json {
            return print_json(&serde_json::json!({ "reloaded": id }));
        }
        println!("Reloaded {id}");
        return Ok(());
    }

    let outcome = registry.reload_all();
    if json {
        return print_json(&outcome);
    }
    for (id, ok) in &outcome {
        println!("  {} {id}", if *ok { "reloaded" } else { "FAILED  " });
    }
    let failed = outcome.values().filter(|ok| !**ok).count();
    if failed > 0 {
        return Err(format!("{failed} provider(s) failed to reload").into());
    }
    Ok(())
}
