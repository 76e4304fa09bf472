use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq)]
pub enum AssetSource {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

/// An image selected by the user. Replaced wholesale on a new selection,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    asset_id: Uuid,
    source: AssetSource,
    mime_type: Option<String>,
}

impl ImageAsset {
    /// Wraps in-memory bytes. Without a declared MIME type the format is
    /// sniffed from the leading magic bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, mime_type: Option<&str>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let mime_type = mime_type
            .map(str::to_string)
            .or_else(|| sniff_mime_type(&bytes));
        Self {
            asset_id: Uuid::new_v4(),
            source: AssetSource::Bytes(Arc::from(bytes)),
            mime_type,
        }
    }

    /// References a file on disk. The file is only read when the asset is encoded.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mime_type = ImageFormat::from_path(&path)
            .ok()
            .map(|format| format.to_mime_type().to_string());
        Self {
            asset_id: Uuid::new_v4(),
            source: AssetSource::File(path),
            mime_type,
        }
    }

    pub fn id(&self) -> Uuid {
        self.asset_id
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(FALLBACK_MIME_TYPE)
    }

    pub fn name(&self) -> String {
        match &self.source {
            AssetSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
            AssetSource::File(path) => path.display().to_string(),
        }
    }

    /// True only when emptiness is known without touching the filesystem.
    pub fn is_known_empty(&self) -> bool {
        matches!(&self.source, AssetSource::Bytes(bytes) if bytes.is_empty())
    }
}

pub(crate) fn sniff_mime_type(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}
