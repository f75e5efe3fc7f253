use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sftpflow",
    version,
    about = "Run single SFTP operations against saved server profiles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v for verbose, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode: suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding profiles.toml (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one operation and print the result as JSON
    Run(RunArgs),

    /// Read JSON requests from stdin, one per line, and answer on stdout
    Serve(ServeArgs),

    /// Manage saved server profiles
    Profile(ProfileArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for `sftpflow run`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// list, get, put, delete, mkdir, rmdir, rename, exists or stat
    pub operation: String,

    /// Remote path to operate on (default: /)
    pub remote_path: Option<String>,

    /// Saved profile to connect with
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Local file: download target for get, upload source for put
    #[arg(short, long, value_name = "PATH")]
    pub local: Option<String>,

    /// Destination path for rename
    #[arg(long, value_name = "PATH")]
    pub new_path: Option<String>,

    /// Create or remove directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Override the profile's host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the profile's port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the profile's username
    #[arg(long)]
    pub user: Option<String>,

    /// Upload content from this file (`-` for stdin) instead of --local
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

/// Arguments for `sftpflow serve`. These set the defaults each request
/// falls back to.
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Profile used when a request names no server
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Operation used when a request names none
    #[arg(long, default_value = "list")]
    pub operation: String,

    /// Remote path used when a request names none
    #[arg(long, default_value = "/")]
    pub remote_path: String,

    /// Local path used when a request names none
    #[arg(short, long, value_name = "PATH")]
    pub local: Option<String>,

    /// Recursive flag used when a request names none
    #[arg(short, long)]
    pub recursive: bool,
}

/// Arguments for the `sftpflow profile` command.
#[derive(clap::Args, Debug)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub action: Option<ProfileAction>,
}

/// Subcommands for profile management.
#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Save or replace a server profile
    Add(ProfileAddArgs),
    /// Remove a saved profile
    Rm(ProfileRmArgs),
    /// List saved profiles
    List,
}

/// Arguments for `sftpflow profile add`.
#[derive(clap::Args, Debug)]
pub struct ProfileAddArgs {
    /// Profile id (e.g., nas, backup, prod-sftp)
    pub id: String,

    /// Server as sftp://[user@]host[:port]
    pub target: String,

    /// Display label
    #[arg(long)]
    pub label: Option<String>,

    /// Prompt for a password to store with the profile
    #[arg(long)]
    pub password: bool,

    /// Private key file to store with the profile
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Prompt for the private key's passphrase
    #[arg(long, requires = "key")]
    pub passphrase: bool,

    /// Disable keyboard-interactive authentication
    #[arg(long)]
    pub no_keyboard: bool,
}

/// Arguments for `sftpflow profile rm`.
#[derive(clap::Args, Debug)]
pub struct ProfileRmArgs {
    /// Id of the profile to remove
    pub id: String,
}

/// Arguments for the `sftpflow completions` command.
#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
