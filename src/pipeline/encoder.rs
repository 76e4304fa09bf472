use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::detection::{AssetSource, ImageAsset};
use crate::error::AppError;

/// Base64 payload ready for the wire, without any `data:` URI prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    payload: String,
    mime_type: String,
    byte_len: usize,
}

impl EncodedImage {
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

/// Reads the asset's bytes and encodes them. File-backed assets are read
/// here, so nothing touches the disk until the returned future is polled.
pub async fn encode(asset: &ImageAsset) -> Result<EncodedImage, AppError> {
    let encoded = match asset.source() {
        AssetSource::Bytes(bytes) => encode_bytes(bytes, asset.mime_type())?,
        AssetSource::File(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| AppError::EncodingFailed(asset.name(), e))?;
            encode_bytes(&bytes, asset.mime_type())?
        }
    };
    debug!(
        "Encoded {} ({}, {} bytes -> {} base64 chars)",
        asset.name(),
        encoded.mime_type,
        encoded.byte_len,
        encoded.payload.len()
    );
    Ok(encoded)
}

fn encode_bytes(bytes: &[u8], mime_type: &str) -> Result<EncodedImage, AppError> {
    if bytes.is_empty() {
        return Err(AppError::EmptyAsset);
    }
    Ok(EncodedImage {
        payload: STANDARD.encode(bytes),
        mime_type: mime_type.to_string(),
        byte_len: bytes.len(),
    })
}
