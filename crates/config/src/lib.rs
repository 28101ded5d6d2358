//! Layered configuration for quarry.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults.
//! 2. `config.toml`, `config.yaml` and `config.json` in the platform config
//!    directory (`~/.config/quarry/` on Linux).
//! 3. An explicit file passed on the command line.
//! 4. `QUARRY_`-prefixed environment variables, with `__` separating nested
//!    keys (`QUARRY_LOG__LEVEL=debug`, `QUARRY_STORAGES__WORK__KIND=local`).
//!
//! ```yaml
//! storages:
//!   work:
//!     kind: local
//!     location: /home/me/packs
//!   upstream:
//!     kind: github
//!     location: octo/packs@main
//! sync:
//!   remove_on_target: true
//!   exclude: [".git", "*.bak"]
//! log:
//!   level: debug
//!   format: json
//! ```

pub mod error;
mod log;

pub use crate::log::{LogConfig, LogFormat};

use crate::error::{ErrorKind, Result};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use quarry_reconcile::SyncOptions;
use quarry_storage::{BackendSpec, UntrustedLimits};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "QUARRY_";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named storages, opened through a
    /// [`BackendRegistry`](quarry_storage::BackendRegistry).
    pub storages: BTreeMap<String, BackendSpec>,
    /// Defaults for `quarry sync`.
    pub sync: SyncOptions,
    /// Bounds for imported shareable payloads.
    pub untrusted: UntrustedLimits,
    pub log: LogConfig,
}

impl Config {
    /// The platform configuration directory, if the platform has one.
    pub fn directory() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "quarry", "quarry").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Load from every source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(Self::directory().as_deref(), explicit)?)
    }

    /// Layer the sources without extracting them.
    pub fn figment(directory: Option<&Path>, explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(directory) = directory {
            figment = figment
                .merge(Toml::file(directory.join("config.toml")))
                .merge(Yaml::file(directory.join("config.yaml")))
                .merge(Json::file(directory.join("config.json")));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::MissingFile(path.display().to_string()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|err| ErrorKind::Invalid(err.to_string()))?;
        config.validate()?;
        tracing::debug!(storages = config.storages.len(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, spec) in &self.storages {
            if spec.kind.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid(format!("storage {name:?} has no kind")));
            }
        }
        if self.untrusted.max_length == 0 {
            exn::bail!(ErrorKind::Invalid("untrusted.max_length must be positive".into()));
        }
        self.log.validate()
    }

    /// The backend specification configured under `name`.
    pub fn storage(&self, name: &str) -> Result<&BackendSpec> {
        match self.storages.get(name) {
            Some(spec) => Ok(spec),
            None => exn::bail!(ErrorKind::UnknownStorage(name.to_string())),
        }
    }
}
