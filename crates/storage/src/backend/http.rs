//! Read-only HTTP backend.
//!
//! Serves a static tree published on a plain web server. Each folder carries
//! an `index.json` document listing its children:
//!
//! ```json
//! { "files": ["manifest.json", "pack_icon.png"], "folders": ["textures"] }
//! ```
//!
//! A folder without an index is empty. Files are fetched with a plain `GET`;
//! any status other than success, `404` included, is a soft failure.

use crate::backend::{Backend, FileEntry, FolderEntry, Listing, refuse_write};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::name::is_usable_file_name;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;
use tracing::instrument;

const INDEX_DOCUMENT: &str = "index.json";

#[derive(Debug, Default, Deserialize)]
struct FolderIndex {
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    folders: Vec<String>,
}

#[derive(Clone)]
pub struct HttpBackend {
    name: String,
    /// Base URL without a trailing slash.
    base: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(name: impl Into<String>, base: impl AsRef<str>) -> Self {
        Self::with_client(name, base, Client::new())
    }

    pub fn with_client(name: impl Into<String>, base: impl AsRef<str>, client: Client) -> Self {
        let base = base.as_ref().trim_end_matches('/').to_string();
        Self { name: name.into(), base, client }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// `GET` a URL. `Ok(None)` when the server says it isn't there.
    async fn fetch(&self, url: &str) -> Result<Option<reqwest::Response>> {
        let response = self
            .client
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
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_only(&self) -> bool {
        true
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.name))]
    async fn list(&self, folder: &str) -> Result<Listing> {
        let url = self.url(&format!("{folder}{INDEX_DOCUMENT}"));
        let Some(response) = self.fetch(&url).await? else {
            tracing::debug!(url = %url, "no folder index; treating as empty");
            return Ok(Listing::default());
        };
        let body = response.bytes().await.map_err(|err| ErrorKind::Network(format!("{url}: {err}")))?;
        let index: FolderIndex =
            serde_json::from_slice(&body).map_err(|err| ErrorKind::InvalidData(format!("{url}: {err}")))?;
        Ok(Listing {
            files: index.files.into_iter().filter(|name| is_usable_file_name(name)).map(FileEntry::named).collect(),
            folders: index.folders.into_iter().map(FolderEntry::named).collect(),
        })
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.name))]
    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        let url = self.url(path);
        // A listed file that isn't served is a broken tree, not an empty file.
        let Some(response) = self.fetch(&url).await? else {
            exn::bail!(ErrorKind::NotFound(url));
        };
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("json"));
        let body = response.bytes().await.map_err(|err| ErrorKind::Network(format!("{url}: {err}")))?;
        if body.is_empty() {
            exn::bail!(ErrorKind::Network(format!("{url}: empty response body")));
        }
        if is_json && encoding == Encoding::Text {
            // Normalise JSON documents the way a client that parsed them would see them.
            let value: serde_json::Value =
                serde_json::from_slice(&body).map_err(|err| ErrorKind::InvalidData(format!("{url}: {err}")))?;
            let text = serde_json::to_string_pretty(&value).map_err(|err| ErrorKind::InvalidData(err.to_string()))?;
            return Ok(Some(Content::Text(text)));
        }
        Ok(Some(Content::decode(body.to_vec(), encoding)?))
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
