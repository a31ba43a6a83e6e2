//! Request image ingestion — base64 decoding and temp-file lifecycle.
//!
//! The verifier reads images from disk, so inline images are written to
//! uniquely named temp files that live exactly as long as their [`ImageRef`].

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Leading characters of a base64-encoded JPEG (`FF D8 FF`).
const JPEG_BASE64_MAGIC: &str = "/9j";
const DATA_URL_PREFIX: &str = "data:";

/// Standard padded alphabet that tolerates non-zero bits in the final symbol.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// A local image path ready for the verifier.
#[derive(Debug)]
pub enum ImageRef {
    /// Created by this request; the file is deleted when dropped.
    Temporary(NamedTempFile),
    /// Supplied by the caller; never deleted.
    Supplied(PathBuf),
}

impl ImageRef {
    pub fn path(&self) -> &Path {
        match self {
            Self::Temporary(file) => file.path(),
            Self::Supplied(path) => path,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

/// Decode a base64 image, stripping a `data:<mime>;base64,` header if present.
///
/// Everything after the first comma is the payload. ASCII whitespace (line
/// wrapping) is ignored.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(',') {
        Some((_, payload)) => payload,
        None => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_BASE64.decode(compact)
}

/// Whether the second image should be decoded rather than read from disk.
///
/// A real path that happens to begin with `/9j` is misrouted here; callers
/// depend on this sniffing rule.
pub fn looks_like_base64(image: &str) -> bool {
    image.starts_with(DATA_URL_PREFIX) || image.starts_with(JPEG_BASE64_MAGIC)
}

/// Ingest the first image, which is always base64.
pub fn ingest_primary(encoded: &str, temp_dir: &Path) -> Result<ImageRef, crate::error::ApiError> {
    let bytes = decode_base64_image(encoded)?;
    write_temp_image(&bytes, temp_dir)
}

/// Ingest the second image: base64 if it looks like it, else a caller path.
pub fn ingest_secondary(image: &str, temp_dir: &Path) -> Result<ImageRef, crate::error::ApiError> {
    if looks_like_base64(image) {
        ingest_primary(image, temp_dir)
    } else {
        Ok(ImageRef::Supplied(PathBuf::from(image)))
    }
}

fn write_temp_image(bytes: &[u8], temp_dir: &Path) -> Result<ImageRef, crate::error::ApiError> {
    let mut file = tempfile::Builder::new()
        .prefix("faceverify-")
        .suffix(".jpg")
        .tempfile_in(temp_dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    tracing::debug!(path = %file.path().display(), bytes = bytes.len(), "wrote temp image");
    Ok(ImageRef::Temporary(file))
}
