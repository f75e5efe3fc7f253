use std::io::Read;
use std::path::Path;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

mod cli;
mod config;
mod connection;
mod error;
mod executor;
mod request;
mod serve;
mod transport;

use cli::args::{Cli, Commands, ProfileAction, ProfileAddArgs, RunArgs, ServeArgs};
use cli::Verbosity;
use config::profiles::{self, ProfileStore, ServerProfile, DEFAULT_PORT};
use error::SftpFlowError;
use executor::{OperationExecutor, TracingObserver};
use request::{Content, OperationDefaults, OperationRequest};

fn main() {
    let cli = Cli::parse();

    let verbosity = Verbosity::from((cli.quiet, cli.verbose));

    // RUST_LOG overrides the CLI flags
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.as_tracing_filter())),
        )
        .with_writer(std::io::stderr) // stdout carries JSON results
        .init();

    tracing::debug!("Verbosity level: {:?}", verbosity);

    if let Err(err) = run(cli) {
        display_error(&err);
        std::process::exit(1);
    }
}

/// Execute the dispatched command.
fn run(cli: Cli) -> Result<(), SftpFlowError> {
    let config_dir = config::paths::config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_once(&config_dir, args),
        Commands::Serve(args) => serve_requests(&config_dir, args),
        Commands::Profile(args) => {
            let mut store = ProfileStore::load(&config_dir)?;
            match args.action {
                Some(ProfileAction::Add(add)) => add_profile(&mut store, add),
                Some(ProfileAction::Rm(rm)) => {
                    if !store.remove(&rm.id) {
                        return Err(SftpFlowError::ProfileNotFound { id: rm.id });
                    }
                    store.save()?;
                    eprintln!("Removed profile '{}'", rm.id);
                    Ok(())
                }
                Some(ProfileAction::List) | None => {
                    list_profiles(&store);
                    Ok(())
                }
            }
        }
        Commands::Completions(args) => {
            clap_complete::generate(
                args.shell,
                &mut Cli::command(),
                "sftpflow",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn run_once(config_dir: &Path, args: RunArgs) -> Result<(), SftpFlowError> {
    // Snapshot, so the profile lock is not held while the operation runs
    let registry = ProfileStore::load(config_dir)?.registry();

    let payload = match &args.input {
        Some(path) => Some(Content::Binary(read_input(path)?)),
        None => None,
    };
    let request = OperationRequest {
        operation: Some(args.operation),
        remote_path: args.remote_path,
        local_path: args.local,
        new_path: args.new_path,
        recursive: Some(args.recursive),
        payload,
        host: args.host,
        port: args.port,
        username: args.user,
        ..OperationRequest::default()
    };
    let defaults = OperationDefaults {
        server: args.profile,
        ..OperationDefaults::default()
    };

    let executor = OperationExecutor::new(registry, defaults, transport::ssh::factory())
        .with_observer(TracingObserver);
    let result = executor.execute(&request)?;

    let response = serve::Response::success(None, result);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>, SftpFlowError> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(path)?)
    }
}

fn serve_requests(config_dir: &Path, args: ServeArgs) -> Result<(), SftpFlowError> {
    let registry = ProfileStore::load(config_dir)?.registry();
    let defaults = OperationDefaults {
        server: args.profile,
        operation: args.operation,
        remote_path: args.remote_path,
        local_path: args.local.unwrap_or_default(),
        recursive: args.recursive,
    };
    if registry.is_empty() {
        tracing::warn!("No server profiles saved; every request will fail");
    }
    tracing::info!(
        profiles = registry.len(),
        default_server = ?defaults.server,
        "Serving requests from stdin"
    );

    let executor = OperationExecutor::new(registry, defaults, transport::ssh::factory())
        .with_observer(TracingObserver);
    tracing::debug!(defaults = ?executor.defaults(), "Request defaults");
    serve::serve_stdio(executor)?;
    Ok(())
}

fn add_profile(store: &mut ProfileStore, args: ProfileAddArgs) -> Result<(), SftpFlowError> {
    profiles::validate_profile_id(&args.id)?;
    let target = profiles::parse_target(&args.target)?;

    let private_key = match &args.key {
        Some(path) => Some(Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            SftpFlowError::ProfileError(format!("Cannot read key file {}: {}", path.display(), e))
        })?)),
        None => None,
    };
    let password = if args.password {
        Some(prompt_secret(&format!("Password for {}: ", args.id))?)
    } else {
        None
    };
    let passphrase = if args.passphrase {
        Some(prompt_secret("Key passphrase: ")?)
    } else {
        None
    };

    let profile = ServerProfile {
        name: args.label.unwrap_or_default(),
        host: target.host,
        port: target.port,
        username: target.username,
        password,
        private_key,
        passphrase,
        try_keyboard: args.no_keyboard.then_some(false),
    };

    if store.get(&args.id).is_some() {
        tracing::info!(id = %args.id, "Replacing existing profile");
    }
    let summary = describe(&profile);
    store.add(args.id.clone(), profile);
    store.save()?;
    eprintln!("Saved profile '{}' -> {}", args.id, summary);
    Ok(())
}

fn prompt_secret(prompt: &str) -> Result<profiles::Secret, SftpFlowError> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .map_err(|e| SftpFlowError::ProfileError(format!("Could not read secret: {}", e)))
}

/// One-line description of a profile. Secrets are reported by presence only.
fn describe(profile: &ServerProfile) -> String {
    let user = profile
        .username
        .as_deref()
        .map(|u| format!("{}@", u))
        .unwrap_or_default();
    let mut auth = Vec::new();
    if profile.private_key.is_some() {
        auth.push("key");
    }
    if profile.password.is_some() {
        auth.push("password");
    }
    if profile.try_keyboard() {
        auth.push("keyboard");
    }
    let auth = if auth.is_empty() {
        "none".to_string()
    } else {
        auth.join(",")
    };
    format!(
        "sftp://{}{}:{}  auth: {}",
        user,
        profile.host,
        profile.port.unwrap_or(DEFAULT_PORT),
        auth
    )
}

fn list_profiles(store: &ProfileStore) {
    if store.list().is_empty() {
        println!("No profiles saved.");
        return;
    }
    for (id, profile) in store.list() {
        if profile.name.is_empty() {
            println!("{:<16} {}", id, describe(profile));
        } else {
            println!("{:<16} {}  ({})", id, describe(profile), profile.name);
        }
    }
}

/// Display an error with its optional hint on stderr.
fn display_error(err: &SftpFlowError) {
    eprintln!("error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  hint: {}", suggestion);
    }
}
