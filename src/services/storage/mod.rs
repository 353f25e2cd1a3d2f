pub mod http;

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;

/// Signed download links stay valid for roughly an hour.
pub const SIGNED_URL_TTL_SECS: i64 = 3600;

/// Durable storage for captured ID-proof images. Paths are hierarchical:
/// `{booking_id}/{guest_id}/{side}.{ext}`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the bytes and returns the stored path.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> anyhow::Result<String>;

    /// Time-limited signed URL for a stored path.
    async fn signed_url(&self, path: &str) -> anyhow::Result<String>;

    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Receiving end of an ID-image archive export. The sink owns packaging and
/// any password protection; the export workflow only decides what goes in
/// and under which per-room path.
#[async_trait]
pub trait ArchiveSink: Send {
    async fn add_entry(&mut self, path: &str, bytes: &[u8]) -> anyhow::Result<()>;

    /// Closes the archive and returns its location.
    async fn finalize(&mut self, password: Option<&str>) -> anyhow::Result<String>;
}

/// Splits a `data:<mime>;base64,<payload>` URL into raw bytes and mime type.
pub fn data_url_to_bytes(data_url: &str) -> anyhow::Result<(Vec<u8>, String)> {
    let rest = data_url
        .strip_prefix("data:")
        .context("not a data URL")?;
    let (header, payload) = rest.split_once(',').context("malformed data URL")?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("image/jpeg")
        .to_string();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 payload in data URL")?;

    Ok((bytes, mime))
}

/// Stages archive entries as plain files under a directory. Password
/// protection is applied by whatever packages the staged tree downstream,
/// not here.
pub struct DirectoryArchiveSink {
    root: PathBuf,
    entries: usize,
}

impl DirectoryArchiveSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: 0,
        }
    }
}

#[async_trait]
impl ArchiveSink for DirectoryArchiveSink {
    async fn add_entry(&mut self, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&full, bytes)
            .with_context(|| format!("failed to write {}", full.display()))?;
        self.entries += 1;
        Ok(())
    }

    async fn finalize(&mut self, password: Option<&str>) -> anyhow::Result<String> {
        if password.is_some() {
            tracing::warn!(
                entries = self.entries,
                "directory staging cannot password-protect; the packaging step applies it"
            );
        }
        Ok(self.root.display().to_string())
    }
}
