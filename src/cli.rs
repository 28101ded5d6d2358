use clap::{Args, Parser, Subcommand};
use quarry_reconcile::SyncOptions;
use std::path::PathBuf;

/// Inspect, diff and synchronise configured storages.
///
/// A `LOCATION` is a configured storage name, optionally followed by a
/// folder inside it: `work` or `work:/packs/behavior/`.
#[derive(Debug, Parser)]
#[command(name = "quarry", version)]
pub struct Cli {
    /// Configuration file, layered over the platform config directory.
    #[arg(long, short, global = true, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every file below a location.
    Ls {
        location: String,
    },
    /// Show the differences between two locations.
    Diff {
        original: String,
        updated: String,
        #[command(flatten)]
        diff: DiffArgs,
    },
    /// Package the changes between two locations as a zip or a shareable string.
    Export {
        original: String,
        updated: String,
        #[command(flatten)]
        diff: DiffArgs,
        /// Write zip bytes here; otherwise print a shareable string.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Apply a shareable string produced by `export` onto a location.
    Apply {
        target: String,
        /// The shareable string; read from stdin when omitted.
        payload: Option<String>,
    },
    /// Copy one location onto another.
    Sync {
        source: String,
        target: String,
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// Copy a location writing duplicate files once, recorded in `files.json`.
    Copy {
        source: String,
        target: String,
    },
    /// Materialise the duplicates recorded in a location's `files.json`.
    Restore {
        target: String,
    },
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Also report files only the original has.
    #[arg(long)]
    pub deletions: bool,
    /// Pair up folders when each side has exactly one, whatever their names.
    #[arg(long)]
    pub match_single_child: bool,
}

/// Flags that switch on behaviour; configured defaults can't be switched off
/// from the command line.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Create folders on the target even when empty.
    #[arg(long)]
    pub force_folders: bool,
    /// Rewrite target files even when unchanged.
    #[arg(long)]
    pub force: bool,
    /// Delete target files the source doesn't have.
    #[arg(long)]
    pub remove: bool,
    /// Never overwrite existing target files.
    #[arg(long)]
    pub no_overwrite: bool,
    /// Only sync subfolders of the source.
    #[arg(long)]
    pub skip_root_files: bool,
    /// Name patterns to leave alone (`name`, `*suffix`, `prefix*`, `*part*`).
    #[arg(long, short = 'x')]
    pub exclude: Vec<String>,
    /// Name patterns to copy; everything else is skipped.
    #[arg(long, short = 'i')]
    pub include: Vec<String>,
}

impl SyncArgs {
    pub fn apply(self, defaults: &SyncOptions) -> SyncOptions {
        let mut options = defaults.clone();
        options.force_folders |= self.force_folders;
        options.force_file_updates |= self.force;
        options.remove_on_target |= self.remove;
        options.dont_overwrite_existing_files |= self.no_overwrite;
        options.skip_files_at_root |= self.skip_root_files;
        options.exclude.extend(self.exclude);
        options.include.extend(self.include);
        options
    }
}

/// Split `name[:/folder/]`.
pub fn parse_location(location: &str) -> (&str, &str) {
    match location.split_once(':') {
        Some((name, path)) if path.starts_with('/') => (name, path),
        _ => (location, "/"),
    }
}
