//! Named backend kinds and how to open them from configuration.
//!
//! A [`BackendRegistry`] is built once (usually with
//! [`with_defaults`](BackendRegistry::with_defaults)) and handed to whatever
//! needs to turn a [`BackendSpec`] into a live backend. There is no global
//! list; extra kinds are added with [`register`](BackendRegistry::register).

use crate::backend::{
    Backend, BackendHandle, ContentFetch, GitHubBackend, HttpBackend, KvBackend, LocalBackend, MemoryKv, ReadOnlyBackend, Trash,
};
use crate::error::{ErrorKind, Result};
use crate::model::Storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How to reach one configured storage.
///
/// ```yaml
/// kind: github
/// location: octo/packs@main
/// read_only: true
/// options:
///   fetch: api
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Registered kind (`local`, `kv`, `sled`, `http`, `github`, ...).
    pub kind: String,
    /// Kind-specific location: a directory, a base URL, `owner/repo[@branch]`.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub read_only: bool,
    /// Kind-specific extras.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl BackendSpec {
    pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Self {
        Self { kind: kind.into(), location: location.into(), ..Self::default() }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

type Factory = Arc<dyn Fn(&str, &BackendSpec) -> Result<BackendHandle> + Send + Sync>;

#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Factory>,
}

impl BackendRegistry {
    /// A registry with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("local", open_local);
        registry.register("kv", |name, spec| {
            let store = MemoryKv::default();
            Ok(match spec.option("namespace") {
                Some(namespace) => KvBackend::with_namespace(name, namespace, store).into_handle(),
                None => KvBackend::new(name, store).into_handle(),
            })
        });
        #[cfg(feature = "sled")]
        registry.register("sled", |name, spec| {
            let store = crate::backend::SledKv::open(&spec.location)?;
            Ok(match spec.option("namespace") {
                Some(namespace) => KvBackend::with_namespace(name, namespace, store).into_handle(),
                None => KvBackend::new(name, store).into_handle(),
            })
        });
        registry.register("http", |name, spec| Ok(HttpBackend::new(name, &spec.location).into_handle()));
        registry.register("github", open_github);
        registry
    }

    /// Add (or replace) a kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &BackendSpec) -> Result<BackendHandle> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Open a backend. A read-only spec wraps it in a [`ReadOnlyBackend`].
    pub fn open(&self, name: &str, spec: &BackendSpec) -> Result<BackendHandle> {
        let Some(factory) = self.factories.get(&spec.kind) else {
            exn::bail!(ErrorKind::Unsupported(format!("backend kind {:?}", spec.kind)));
        };
        let backend = factory(name, spec)?;
        tracing::debug!(name, kind = %spec.kind, location = %spec.location, read_only = spec.read_only, "opened backend");
        Ok(if spec.read_only && !backend.read_only() {
            ReadOnlyBackend::new(backend).into_handle()
        } else {
            backend
        })
    }

    /// Open a backend and wrap it in a fresh [`Storage`].
    pub fn open_storage(&self, name: &str, spec: &BackendSpec) -> Result<Storage> {
        Ok(Storage::new(self.open(name, spec)?))
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry").field("kinds", &self.factories.keys().collect::<Vec<_>>()).finish()
    }
}

fn open_local(name: &str, spec: &BackendSpec) -> Result<BackendHandle> {
    let trash = match spec.option("trash") {
        None | Some("noop") => Trash::Noop,
        Some("delete") => Trash::Delete,
        Some(other) => exn::bail!(ErrorKind::Unsupported(format!("trash mode {other:?}"))),
    };
    Ok(LocalBackend::new(name, &spec.location)?.with_trash(trash).into_handle())
}

fn open_github(name: &str, spec: &BackendSpec) -> Result<BackendHandle> {
    let mut backend = GitHubBackend::from_location(name, &spec.location)?;
    backend = match spec.option("fetch") {
        None | Some("raw") => backend.with_fetch(ContentFetch::Raw),
        Some("api") => backend.with_fetch(ContentFetch::Api),
        Some(other) => exn::bail!(ErrorKind::Unsupported(format!("fetch mode {other:?}"))),
    };
    if let Some(token) = spec.option("token") {
        backend = backend.with_token(token);
    }
    if let (Some(api), Some(raw)) = (spec.option("api_base"), spec.option("raw_base")) {
        backend = backend.with_bases(api, raw);
    }
    Ok(backend.into_handle())
}
