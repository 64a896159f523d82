//! `switchyard ask`: one question, one answer.

use switchyard_core::QueryMode;
use switchyard_orchestrator::{QueryRequest, QueryResponse};

use super::{orchestrator, print_json};

pub async fn run(
    user: &str,
    text: &str,
    batch: bool,
    capability: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let mode = if batch { QueryMode::Batch } else { QueryMode::Chat };
    let request = QueryRequest::new(user, text).with_mode(mode);

    let response = match capability {
        Some(cap) => orchestrator.handle_by_capability(cap, request).await,
        None => orchestrator.handle(request).await,
    };

    if json {
        return print_json(&response);
    }
    println!("{}", response.response);
    eprintln!();
    eprintln!("  {}", footer(&response));
    Ok(())
}

/// "single via WeatherAgent in 412ms", for the line under an answer.
pub fn footer(response: &QueryResponse) -> String {
    let strategy = response
        .strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".into());
    let via = if response.providers_used.is_empty() {
        "no provider".to_string()
    } else {
        response.providers_used.join(", ")
    };
    let mut line = format!("{strategy} via {via} in {}ms", response.latency.as_millis());
    if let Some(error) = &response.error {
        line.push_str(&format!(" ({error})"));
    }
    line
}
