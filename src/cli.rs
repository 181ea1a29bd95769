use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sew",
    version = env!("SEW_BUILD_VERSION"),
    about = "Send a codebase snapshot and prompts to a remote model and apply the edits it returns"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default .sewrc with example profiles
    Init,
    /// List the profiles configured in .sewrc
    List,
    /// One-shot: send an input file and a prompt, write the reply artifacts
    Run {
        /// Fold file or plain-text input
        file: PathBuf,
        /// Prompt appended after the profile's prompt_prepend
        message: String,
        #[arg(short, long, default_value = "default")]
        profile: String,
    },
    /// Manage the long-lived session daemon
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start the session daemon in the background from a fold file
    Up {
        file: PathBuf,
        #[arg(short, long, default_value = "default")]
        profile: String,
    },
    /// Run the daemon in the foreground (what `up` spawns)
    #[command(hide = true)]
    Serve {
        file: PathBuf,
        #[arg(short, long, default_value = "default")]
        profile: String,
    },
    /// Send one prompt to the running session
    Query {
        prompt: String,
        /// Artifact path for this query's reply
        #[arg(short, long)]
        output: Option<String>,
        /// Extra file whose content rides along with the prompt
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Show the session's cached files and conversation synopsis
    List,
    /// Renew the session from a fresh fold file
    New { file: PathBuf },
    /// Stop the session daemon
    Down,
}
