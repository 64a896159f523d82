//! `switchyard memory`: read-only views over stored history.

use switchyard_core::InteractionRecord;

use super::{one_line, orchestrator, print_json};

pub async fn history(
    user: &str,
    provider: Option<&str>,
    days: Option<i64>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let memory = orchestrator.memory();

    let mut records = match days {
        Some(days) => memory.recent_ltm(user, days).await,
        None => memory.ltm_by_user(user).await,
    };
    if let Some(provider) = provider {
        records.retain(|r| r.provider_id == provider);
    }

    if json {
        return print_json(&records);
    }

    println!("History for {user} ({} backend)", memory.backend_name());
    if records.is_empty() {
        println!("  Nothing stored yet.");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &InteractionRecord) {
    let status = if record.success { "ok" } else { "failed" };
    println!(
        "  {} {:<16} [{status}]",
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.provider_id
    );
    println!("      Q: {}", one_line(&record.input, 90));
    println!("      A: {}", one_line(&record.output, 90));
}

pub async fn search(
    user: &str,
    text: &str,
    provider: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let result = orchestrator.memory().search_history(user, text, provider).await;

    if json {
        return print_json(&result);
    }

    println!("Searching {user}'s history for \"{text}\"");
    println!();
    if result.similar.is_empty() {
        println!("  No similar queries.");
    } else {
        println!("  Similar queries ({} of {} matches):", result.similar.len(), result.total_matches);
        for m in &result.similar {
            println!(
                "    [{:.2}] {:<16} {}",
                m.similarity,
                m.provider_id,
                one_line(&m.content, 70)
            );
        }
    }
    if !result.recent_interactions.is_empty() {
        println!();
        println!("  Recent interactions:");
        for record in &result.recent_interactions {
            print_record(record);
        }
    }
    Ok(())
}

pub async fn session(user: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;
    let sessions = orchestrator.memory().sessions_for_user(user).await;

    if json {
        return print_json(&sessions);
    }

    if sessions.is_empty() {
        println!("No sessions for {user} in this process.");
        println!("Sessions live as long as `switchyard chat`; use /session there.");
        return Ok(());
    }
    for s in &sessions {
        let state = if s.ended_at.is_some() { "ended" } else { "active" };
        println!(
            "  {} {:<6} {} turns, started {} [{state}]",
            s.session_id,
            s.mode.to_string(),
            s.turn_count,
            s.started_at.format("%Y-%m-%d %H:%M")
        );
        if !s.title.is_empty() {
            println!("      {}", one_line(&s.title, 80));
        }
    }
    Ok(())
}
