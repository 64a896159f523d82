//! `switchyard chat`: interactive session.
//!
//! Each line is routed like `ask`, but the process stays up, so session
//! turns and short-term memory carry over between questions.

use std::io::Write;

use switchyard_orchestrator::{Orchestrator, QueryRequest};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use super::ask::footer;
use super::{one_line, orchestrator};

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Help,
    Session,
    NewSession,
    /// `/profile` shows the cached profile, `/profile <json>` replaces it.
    Profile(Option<&'a str>),
    Digest,
    Unknown(&'a str),
    Question(&'a str),
}

fn parse(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "exit" | "quit" | "/exit" | "/quit" | ":q" => Input::Exit,
        "/help" => Input::Help,
        "/session" => Input::Session,
        "/new" => Input::NewSession,
        "/profile" => Input::Profile(None),
        "/digest" => Input::Digest,
        cmd if cmd.starts_with("/profile ") => Input::Profile(Some(cmd["/profile ".len()..].trim())),
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        text => Input::Question(text),
    }
}

pub async fn run(user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = orchestrator().await?;

    println!();
    println!("  Switchyard chat");
    println!();
    println!("  User:       {user}");
    println!("  Model:      {}", orchestrator.model().backend_name());
    println!("  Memory:     {}", orchestrator.memory().backend_name());
    println!("  Providers:  {}", orchestrator.registry().len());
    println!();
    println!("  Type a question and press Enter. /help lists commands.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        match parse(&line) {
            Input::Empty => {}
            Input::Exit => break,
            Input::Help => print_help(),
            Input::Session => print_session(&orchestrator, user).await,
            Input::NewSession => {
                if let Some(ended) = orchestrator.memory().end_session(user).await {
                    println!("  Ended session {} ({} turns)", ended.session_id, ended.turn_count);
                }
            }
            Input::Profile(None) => match orchestrator.memory().profile(user).await {
                Some(profile) => println!("  Profile: {profile}"),
                None => println!("  No profile saved"),
            },
            Input::Profile(Some(raw)) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(profile) if profile.is_object() => {
                    orchestrator.memory().cache_profile(user, profile).await;
                    println!("  Profile saved");
                }
                Ok(_) => println!("  A profile must be a JSON object"),
                Err(e) => println!("  Invalid JSON: {e}"),
            },
            Input::Digest => match orchestrator.memory().weekly_digest(user).await {
                Some(digest) => println!("  {digest}"),
                None => println!("  Nothing asked this week"),
            },
            Input::Unknown(cmd) => println!("  Unknown command {cmd}, try /help"),
            Input::Question(text) => {
                eprint!("  ...");
                let response = orchestrator.handle(QueryRequest::new(user, text)).await;
                eprint!("\r     \r");
                println!();
                for line in response.response.lines() {
                    println!("  Assistant > {line}");
                }
                println!("  [{}]", footer(&response));
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_help() {
    println!("  /session  show the current session");
    println!("  /new      end the session and start fresh");
    println!("  /profile  show the saved profile; /profile {{json}} replaces it");
    println!("  /digest   summarize the last week of questions");
    println!("  /exit     quit");
}

async fn print_session(orchestrator: &Orchestrator, user: &str) {
    let Some(active) = orchestrator.memory().active_session(user).await else {
        println!("  No active session");
        return;
    };
    let Some(summary) = orchestrator.memory().session_summary(&active.session_id).await else {
        return;
    };
    println!("  Session {} started {}", active.session_id, active.started_at.format("%H:%M:%S"));
    if !summary.providers_used.is_empty() {
        let used: Vec<&str> = summary.providers_used.iter().map(String::as_str).collect();
        println!("  Providers: {}", used.join(", "));
    }
    for turn in &summary.turns {
        println!("  {:>20}: {}", turn.role, one_line(&turn.text, 70));
    }
}
