//! Read-only backend over a repository on a Git hosting service.
//!
//! Folders are listed through the hosting service's contents API. File
//! content comes either from the same API (base64 in a JSON envelope) or
//! straight from the raw-content CDN, chosen by [`ContentFetch`].

use crate::backend::{Backend, FileEntry, FolderEntry, Listing, refuse_write};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::name::is_usable_file_name;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, StatusCode, header::USER_AGENT};
use serde::Deserialize;
use tracing::instrument;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
const DEFAULT_BRANCH: &str = "main";

/// Where file content is fetched from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentFetch {
    /// Contents API; works from browser-hosted contexts that can't reach the CDN.
    Api,
    /// Raw-content CDN; no API rate limit.
    #[default]
    Raw,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Clone)]
pub struct GitHubBackend {
    name: String,
    owner: String,
    repo: String,
    branch: String,
    fetch: ContentFetch,
    api_base: String,
    raw_base: String,
    token: Option<String>,
    client: Client,
}

impl GitHubBackend {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            fetch: ContentFetch::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            token: None,
            client: Client::new(),
        }
    }

    /// Parse an `owner/repo` or `owner/repo@branch` location.
    pub fn from_location(name: impl Into<String>, location: &str) -> Result<Self> {
        let (repository, branch) = match location.split_once('@') {
            Some((repository, branch)) => (repository, Some(branch)),
            None => (location, None),
        };
        let Some((owner, repo)) = repository.trim_matches('/').split_once('/') else {
            exn::bail!(ErrorKind::InvalidPath(location.to_string()));
        };
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            exn::bail!(ErrorKind::InvalidPath(location.to_string()));
        }
        let backend = Self::new(name, owner, repo);
        Ok(match branch {
            Some(branch) if !branch.is_empty() => backend.with_branch(branch),
            _ => backend,
        })
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_fetch(mut self, fetch: ContentFetch) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Point at a different API and raw-content host (enterprise installs, tests).
    pub fn with_bases(mut self, api_base: impl AsRef<str>, raw_base: impl AsRef<str>) -> Self {
        self.api_base = api_base.as_ref().trim_end_matches('/').to_string();
        self.raw_base = raw_base.as_ref().trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, path: &str) -> String {
        let path = path.trim_end_matches('/');
        format!("{}/repos/{}/{}/contents{path}?ref={}", self.api_base, self.owner, self.repo, self.branch)
    }

    fn raw_url(&self, path: &str) -> String {
        format!("{}/{}/{}/{}{path}", self.raw_base, self.owner, self.repo, self.branch)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url).header(USER_AGENT, concat!("quarry/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Option<reqwest::Response>> {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|err| ErrorKind::Network(format!("{url}: {err}")))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => exn::bail!(ErrorKind::Network(format!("{url}: HTTP {status}"))),
        }
    }

    async fn read_api(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.contents_url(path);
        let Some(response) = self.fetch(&url).await? else {
            exn::bail!(ErrorKind::NotFound(url));
        };
        let envelope: FileEnvelope =
            response.json().await.map_err(|err| ErrorKind::InvalidData(format!("{url}: {err}")))?;
        let content = envelope.content.unwrap_or_default();
        match envelope.encoding.as_deref() {
            Some("base64") => {
                // The API wraps base64 payloads at 60 columns.
                let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                let bytes = STANDARD
                    .decode(compact)
                    .map_err(|err| ErrorKind::InvalidData(format!("{url}: {err}")))?;
                Ok(bytes)
            },
            _ => Ok(content.into_bytes()),
        }
    }

    async fn read_raw(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.raw_url(path);
        let Some(response) = self.fetch(&url).await? else {
            exn::bail!(ErrorKind::NotFound(url));
        };
        let body = response.bytes().await.map_err(|err| ErrorKind::Network(format!("{url}: {err}")))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Backend for GitHubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_only(&self) -> bool {
        true
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.name, repo = %self.repo))]
    async fn list(&self, folder: &str) -> Result<Listing> {
        let url = self.contents_url(folder);
        let Some(response) = self.fetch(&url).await? else {
            return Ok(Listing::default());
        };
        let entries: Vec<DirectoryEntry> =
            response.json().await.map_err(|err| ErrorKind::InvalidData(format!("{url}: {err}")))?;
        let mut listing = Listing::default();
        for entry in entries {
            match entry.kind.as_str() {
                "dir" => listing.folders.push(FolderEntry::named(entry.name)),
                "file" if is_usable_file_name(&entry.name) => {
                    listing.files.push(FileEntry { size: entry.size, ..FileEntry::named(entry.name) });
                },
                other => tracing::trace!(name = %entry.name, kind = other, "skipping repository entry"),
            }
        }
        Ok(listing)
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.name, fetch = ?self.fetch))]
    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        let bytes = match self.fetch {
            ContentFetch::Api => self.read_api(path).await?,
            ContentFetch::Raw => self.read_raw(path).await?,
        };
        Ok(Some(Content::decode(bytes, encoding)?))
    }

    async fn write(&self, path: &str, _content: &Content) -> Result<()> {
        Err(refuse_write(&self.name, path))
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        Err(refuse_write(&self.name, path))
    }

    async fn create_folder(&self, folder: &str) -> Result<()> {
        Err(refuse_write(&self.name, folder))
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        Err(refuse_write(&self.name, folder))
    }
}
