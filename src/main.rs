mod changes;
mod commands;
mod commit;
mod config;
mod editor;
mod error;
mod github;
mod session;
mod shell;
#[cfg(test)]
mod test_utils;
mod workspace;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "xgit", version, about = "Edit and commit GitHub repository files without a checkout")]
struct Cli {
    #[arg(long, short, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a personal access token and store it
    Login {
        #[arg(long, help = "Token to store (read from stdin if omitted)")]
        token: Option<String>,
    },
    /// Forget the stored token and workspace
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List repositories you can access
    Repos,
    /// Select the repository later commands work on
    Use {
        #[arg(help = "Repository as owner/name")]
        repo: String,
        #[arg(long, short, help = "Branch (defaults to the repository's default branch)")]
        branch: Option<String>,
    },
    /// List a directory
    Ls { path: Option<String> },
    /// Change the remembered directory
    Cd { path: String },
    /// Print a file
    Cat { path: String },
    /// Show recent commits, optionally for one path
    Log { path: Option<String> },
    /// Commit local files over their counterparts in the repository
    Push {
        #[arg(long, short, help = "Commit message")]
        message: String,
        #[arg(long, default_value = "", help = "Repository directory the files map into")]
        prefix: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Interactive session: open, edit, stage and commit files
    Shell,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "xgit=debug" } else { "xgit=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load();
    tracing::debug!("{config:?}");

    match commands::run(cli.command, &config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            if matches!(e, error::XgitError::NotSignedIn) {
                eprintln!("hint: run `xgit login` or set GITHUB_TOKEN");
            } else if matches!(e, error::XgitError::NoRepository) {
                eprintln!("hint: run `xgit use <owner/name>` first");
            }
            std::process::exit(1);
        }
    }
}
