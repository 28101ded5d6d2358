//! Import of shared tree payloads from untrusted sources.
//!
//! A shareable payload is a zip of files, base64-encoded so it fits in a URL
//! fragment. Anything that arrives this way is validated before it is
//! exposed as a [`Storage`]: the string length, the expanded size, every
//! entry name and the text content of every file.

use crate::backend::ArchiveBackend;
use crate::content::Encoding;
use crate::error::{ErrorKind, Result};
use crate::model::Storage;
use crate::name::{canonicalize_name, is_usable_file_name};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use quarry_archive::Archive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Bounds applied to untrusted payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UntrustedLimits {
    /// Longest accepted payload string, in bytes.
    pub max_length: usize,
    /// Largest accepted total size of the decoded files, in bytes.
    pub max_expanded: u64,
    /// Case-insensitive terms that may not appear in any text file.
    pub blocked_terms: Vec<String>,
}

impl Default for UntrustedLimits {
    fn default() -> Self {
        Self { max_length: 4 * 1024 * 1024, max_expanded: 32 * 1024 * 1024, blocked_terms: Vec::new() }
    }
}

fn reject(reason: impl Into<String>) -> crate::error::Error {
    let reason = reason.into();
    tracing::warn!(reason = %reason, "untrusted payload rejected");
    exn::Exn::from(ErrorKind::Untrusted(reason))
}

fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let payload = payload.trim().trim_start_matches('#');
    for engine in [&STANDARD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(bytes) = engine.decode(payload) {
            return Ok(bytes);
        }
    }
    Err(reject("payload is not base64"))
}

/// Every segment must already be in canonical form, so what is shown is
/// exactly what gets keyed.
fn check_segments(path: &str) -> Result<()> {
    for segment in path.split('/') {
        if segment.is_empty() || canonicalize_name(segment) != segment {
            return Err(reject(format!("unacceptable name {path:?}")));
        }
    }
    Ok(())
}

/// Validate a shareable payload and expose it as a read-only storage.
#[instrument(level = "debug", skip(payload, limits), fields(length = payload.len()))]
pub fn create_storage_from_untrusted_string(payload: &str, limits: &UntrustedLimits) -> Result<Storage> {
    if payload.len() > limits.max_length {
        return Err(reject(format!("payload is {} bytes; the limit is {}", payload.len(), limits.max_length)));
    }
    let bytes = decode_base64(payload)?;
    let archive = Archive::decode_with_limit(&bytes, limits.max_expanded)
        .map_err(|err| reject(format!("payload is not a usable archive: {}", *err)))?;

    for folder in archive.folders() {
        check_segments(&folder)?;
    }
    let blocked: Vec<String> = limits.blocked_terms.iter().map(|term| term.to_lowercase()).collect();
    for (path, data) in archive.files() {
        check_segments(path)?;
        let name = path.rsplit('/').next().unwrap_or(path);
        if !is_usable_file_name(name) {
            return Err(reject(format!("file type not allowed: {path:?}")));
        }
        if Encoding::for_name(name) == Encoding::Text {
            let Ok(text) = std::str::from_utf8(data) else {
                return Err(reject(format!("{path:?} is not text")));
            };
            let lower = text.to_lowercase();
            if blocked.iter().any(|term| !term.is_empty() && lower.contains(term.as_str())) {
                return Err(reject(format!("{path:?} contains blocked content")));
            }
        }
    }
    tracing::debug!(files = archive.len(), "untrusted payload accepted");
    let backend = Arc::new(ArchiveBackend::new("untrusted", archive));
    Ok(Storage::with_read_only(backend, true))
}
