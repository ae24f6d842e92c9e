//! Interactive terminal front-end.

use crate::bootstrap::App;
use anyhow::Result;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

pub const CHANNEL: &str = "repl";

/// What the REPL should do with one line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Skip,
    Quit,
    /// Start a fresh conversation under a new user id.
    NewSession,
    Help,
    Message(&'a str),
}

pub fn parse_line(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Skip;
    }
    match line.to_lowercase().as_str() {
        "/quit" | "/exit" | "/q" => ReplCommand::Quit,
        "/new" => ReplCommand::NewSession,
        "/help" => ReplCommand::Help,
        _ => ReplCommand::Message(line),
    }
}

fn fresh_user_id(base: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}-{}", base, secs)
}

fn print_banner(app: &App) {
    println!("Palaver");
    println!("  Model: {}", app.config.model);
    println!("  Workspace: {}", app.config.workspace_dir.display());
    println!("  Agents: {}", app.controller.router().agent_names().join(", "));
    println!("  Tools: {}", app.tool_names.join(", "));
    let prefixes = app.controller.router().prefixes();
    if prefixes.is_empty() {
        println!("  Commands: /new (reset), /help, /quit");
    } else {
        println!(
            "  Commands: /new (reset), {} <query>, /help, /quit",
            prefixes.join(" <query>, ")
        );
    }
    println!();
}

pub async fn run(app: App, user: &str) -> Result<()> {
    print_banner(&app);
    let mut user_id = user.to_string();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        // Read on a blocking thread so tool approvals can share stdin
        let line = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            io::stdin().read_line(&mut input).map(|n| (n, input))
        })
        .await??;

        let (read, input) = line;
        if read == 0 {
            println!("\nGoodbye!");
            break;
        }

        match parse_line(&input) {
            ReplCommand::Skip => continue,
            ReplCommand::Quit => {
                println!("Goodbye!");
                break;
            }
            ReplCommand::NewSession => {
                user_id = fresh_user_id(user);
                println!("  Session reset.\n");
            }
            ReplCommand::Help => print_banner(&app),
            ReplCommand::Message(text) => {
                match app.controller.handle(CHANNEL, &user_id, text).await {
                    Ok(reply) => println!("\nAssistant: {}\n", reply),
                    Err(e) => {
                        error!("Turn failed: {}", e);
                        println!("\n  Error: {}\n", e);
                    }
                }
            }
        }
    }

    Ok(())
}
