use clap::{Parser, Subcommand};

/// Command-line options for quickmail.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Gmail address to authenticate as.
    #[arg(long, env = "QUICKMAIL_USER")]
    pub user: String,

    /// OAuth2 access token with the https://mail.google.com/ scope.
    #[arg(long, env = "QUICKMAIL_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List inbox threads.
    Threads,
    /// Show one thread; defaults to the newest inbox thread.
    Show {
        #[arg(long)]
        thread: Option<String>,
    },
    /// Remove a thread from the inbox.
    Archive { thread: String },
}
