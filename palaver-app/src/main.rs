use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use palaver_app::approval::StdinApprover;
use palaver_app::bootstrap::{build_app, open_log, prepare_workspace};
use palaver_app::config::{Config, DEFAULT_CONFIG_FILE};
use palaver_app::repl;
use palaver_runtime::ToolObserver;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "palaver", version, about = "Tool-using conversational agent")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session (default).
    Repl {
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Run one turn and print the reply.
    Ask {
        #[arg(long, default_value = "local")]
        user: String,
        text: String,
    },
    /// Inspect stored conversations.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Debug, Subcommand)]
enum SessionsAction {
    List,
    Count { id: String },
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Repl {
        user: "local".to_string(),
    }) {
        Command::Repl { user } => {
            let app = build_app(config, Box::new(StdinApprover), Some(tool_printer()))?;
            repl::run(app, &user).await
        }
        Command::Ask { user, text } => {
            let app = build_app(config, Box::new(StdinApprover), Some(tool_printer()))?;
            let reply = app
                .controller
                .handle("cli", &user, &text)
                .await
                .context("Turn failed")?;
            println!("{}", reply);
            Ok(())
        }
        Command::Sessions { action } => sessions(&config, action),
    }
}

fn sessions(config: &Config, action: SessionsAction) -> Result<()> {
    prepare_workspace(config)?;
    let log = open_log(config)?;

    match action {
        SessionsAction::List => {
            for key in log.list()? {
                println!("{}", key);
            }
        }
        SessionsAction::Count { id } => {
            println!("{}", log.count(&id)?);
        }
        SessionsAction::Delete { id } => {
            if log.delete(&id)? {
                println!("Deleted {}", id);
            } else {
                println!("No conversation {}", id);
            }
        }
    }
    Ok(())
}

fn tool_printer() -> Arc<dyn ToolObserver> {
    Arc::new(|name: &str, _args: &serde_json::Value, result: &str| {
        let preview: String = result.chars().take(80).collect();
        println!("  [{}] {}", name, preview.replace('\n', " "));
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("palaver=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
