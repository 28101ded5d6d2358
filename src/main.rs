mod cli;
mod error;

use crate::cli::{Cli, Command, DiffArgs, parse_location};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use futures::TryStreamExt;
use quarry_config::{Config, LogConfig, LogFormat};
use quarry_reconcile::{DifferenceSet, get_differences, sync_folder_to};
use quarry_storage::manifest::{PathHashTable, bulk_copy, restore};
use quarry_storage::{BackendRegistry, File, Folder, create_storage_from_untrusted_string};
use std::io::Read;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    init_logging(&config.log);
    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "command failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        },
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output stays pipeable.
fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
    }
}

struct Context<'a> {
    config: &'a Config,
    registry: BackendRegistry,
}

impl Context<'_> {
    async fn folder(&self, location: &str) -> Result<Folder> {
        let (name, path) = parse_location(location);
        let spec = self.config.storage(name).or_raise(|| ErrorKind::Open(name.to_string()))?;
        let storage = self.registry.open_storage(name, spec).or_raise(|| ErrorKind::Open(name.to_string()))?;
        let folder = storage.root_folder().get_folder_from_relative_path(path).await.or_raise(|| ErrorKind::Storage)?;
        match folder {
            Some(folder) => Ok(folder),
            None => exn::bail!(ErrorKind::MissingFolder(name.to_string(), path.to_string())),
        }
    }

    async fn differences(&self, original: &str, updated: &str, args: &DiffArgs) -> Result<DifferenceSet> {
        let original = self.folder(original).await?;
        let updated = self.folder(updated).await?;
        get_differences(&original, &updated, args.deletions, args.match_single_child).await.or_raise(|| ErrorKind::Reconcile)
    }
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let context = Context { config, registry: BackendRegistry::with_defaults() };
    match command {
        Command::Ls { location } => {
            let folder = context.folder(&location).await?;
            let files: Vec<File> = folder.files_recursive().try_collect().await.or_raise(|| ErrorKind::Storage)?;
            for file in files {
                let path = file.path().or_raise(|| ErrorKind::Storage)?;
                match file.error_state_message().or_raise(|| ErrorKind::Storage)? {
                    Some(message) => println!("{path}\t! {message}"),
                    None => println!("{path}"),
                }
            }
        },
        Command::Diff { original, updated, diff } => {
            let set = context.differences(&original, &updated, &diff).await?;
            for difference in set.file_differences() {
                println!("{:?}\t{}", difference.kind, difference.path);
            }
            for difference in set.folder_differences() {
                println!("[{}]\t{}", difference.kind, difference.path);
            }
        },
        Command::Export { original, updated, diff, output } => {
            let set = context.differences(&original, &updated, &diff).await?;
            match output {
                Some(output) => {
                    let bytes = set.to_zip_bytes().await.or_raise(|| ErrorKind::Reconcile)?;
                    std::fs::write(&output, bytes).map_err(|err| ErrorKind::Io(format!("{}: {err}", output.display())))?;
                    tracing::info!(path = %output.display(), files = set.updates_and_adds().count(), "exported");
                },
                None => println!("{}", set.to_shareable_string().await.or_raise(|| ErrorKind::Reconcile)?),
            }
        },
        Command::Apply { target, payload } => {
            let payload = match payload {
                Some(payload) => payload,
                None => {
                    let mut payload = String::new();
                    std::io::stdin().read_to_string(&mut payload).map_err(|err| ErrorKind::Io(err.to_string()))?;
                    payload
                },
            };
            let incoming = create_storage_from_untrusted_string(&payload, &config.untrusted).or_raise(|| ErrorKind::Storage)?;
            let target = context.folder(&target).await?;
            let options = quarry_reconcile::SyncOptions::default();
            let written = sync_folder_to(&incoming.root_folder(), &target, &options, None).await.or_raise(|| ErrorKind::Reconcile)?;
            println!("{written} file(s) written");
        },
        Command::Sync { source, target, sync } => {
            let options = sync.apply(&config.sync);
            let source = context.folder(&source).await?;
            let target = context.folder(&target).await?;
            let report = |message: &str| tracing::info!("{message}");
            let modified = sync_folder_to(&source, &target, &options, Some(&report)).await.or_raise(|| ErrorKind::Reconcile)?;
            println!("{modified} file(s) modified");
        },
        Command::Copy { source, target } => {
            let source = context.folder(&source).await?;
            let target = context.folder(&target).await?;
            let mut table = PathHashTable::new();
            let manifest = bulk_copy(&source, &target, &mut table).await.or_raise(|| ErrorKind::Storage)?;
            println!("{} file(s) copied, {} deduplicated", manifest.files.len(), manifest.duplicates().count());
        },
        Command::Restore { target } => {
            let target = context.folder(&target).await?;
            let restored = restore(&target).await.or_raise(|| ErrorKind::Storage)?;
            println!("{restored} file(s) restored");
        },
    }
    Ok(())
}
