pub mod cli;
pub mod client;
pub mod codebase;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod extract;
pub mod protocol;
pub mod provider;
pub mod runner;
pub mod spinner;
pub mod summary;

use anyhow::Context;
use clap::Parser;

use crate::cli::{Cli, Commands, SessionAction};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::provider::OpenAiCompatClient;
use crate::spinner::SpinnerGuard;

pub fn main_inner() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = std::env::current_dir().context("failed to resolve working directory")?;

    match cli.command {
        Commands::Init => config::create_default_config(&dir),
        Commands::List => {
            config::print_profiles(&dir);
            Ok(())
        }
        Commands::Run {
            file,
            message,
            profile,
        } => {
            let settings = config::load_config(&dir, &profile);
            let client = OpenAiCompatClient::from_env()?;
            runner::run_once(&dir, &file, &message, &profile, &settings, &client)
        }
        Commands::Session { action } => dispatch_session(&dir, action),
    }
}

fn dispatch_session(dir: &std::path::Path, action: SessionAction) -> anyhow::Result<()> {
    match action {
        SessionAction::Up { file, profile } => {
            if client::is_daemon_running(dir) {
                anyhow::bail!("a session is already running; `sew session down` first");
            }
            client::spawn_daemon(dir, &file, &profile)?;
            println!("Session started from {}", file.display());
            Ok(())
        }
        SessionAction::Serve { file, profile } => {
            let settings = config::load_config(dir, &profile);
            let brief = config::load_brief(dir);
            let llm = OpenAiCompatClient::from_env()?;
            daemon::run(dir, &file, &profile, settings, brief, &llm)
        }
        SessionAction::Query {
            prompt,
            output,
            input,
        } => {
            let input_content = match input {
                Some(path) => Some(std::fs::read_to_string(&path).with_context(|| {
                    format!("failed to read input file {}", path.display())
                })?),
                None => None,
            };
            let request = DaemonRequest::Query {
                prompt,
                output,
                input_content,
            };
            let response = {
                let _spinner = SpinnerGuard::new();
                client::send_request(dir, &request)?
            };
            match response {
                DaemonResponse::Query {
                    message,
                    summary,
                    elapsed_secs,
                } => {
                    if !message.is_empty() {
                        println!("{message}");
                    }
                    println!("{summary}");
                    eprintln!("response received in {elapsed_secs:.1}s");
                    Ok(())
                }
                other => report_plain(other),
            }
        }
        SessionAction::List => match client::send_request(dir, &DaemonRequest::List)? {
            DaemonResponse::List {
                files,
                instructions,
            } => {
                println!("Cached files:");
                if files.is_empty() {
                    println!("  (none)");
                }
                for path in files {
                    println!("  {path}");
                }
                println!("Instruction summary:");
                for item in instructions {
                    let role = match item.role {
                        conversation::Role::System => "system",
                        conversation::Role::User => "user",
                        conversation::Role::Assistant => "assistant",
                    };
                    match item.name {
                        Some(name) => println!("  {role} ({name}): {}", item.synopsis),
                        None => println!("  {role}: {}", item.synopsis),
                    }
                }
                Ok(())
            }
            other => report_plain(other),
        },
        SessionAction::New { file } => {
            let request = DaemonRequest::New {
                file: file.display().to_string(),
            };
            report_plain(client::send_request(dir, &request)?)
        }
        SessionAction::Down => report_plain(client::send_request(dir, &DaemonRequest::Down)?),
    }
}

/// Print a simple response; a daemon-side error becomes our exit error.
fn report_plain(response: DaemonResponse) -> anyhow::Result<()> {
    match response {
        DaemonResponse::Error { error } => anyhow::bail!("{error}"),
        DaemonResponse::Message { message } => {
            println!("{message}");
            Ok(())
        }
        other => {
            tracing::debug!("unexpected response shape: {other:?}");
            Ok(())
        }
    }
}
