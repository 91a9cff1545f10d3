//! Content classification: decide what a downloaded payload really is.
//!
//! The drive's `Content-Type` is a hint. For ordinary uploads it is right
//! and we trust it. For anything it cannot name it sends
//! `application/octet-stream`, and then the bytes decide: a `%PDF-` header
//! means a document, anything else falls to [`UnknownPayloadPolicy`].
//!
//! Classification renames an opaque `.bin` payload to the extension it was
//! classified as, so later stages can dispatch on the extension alone.

use crate::config::UnknownPayloadPolicy;
use crate::error::ConvertError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extension used when the declared type says nothing useful.
pub const GENERIC_EXTENSION: &str = "bin";

/// Leading bytes of every PDF file.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Extension assigned to opaque payloads assumed to be camera-native images.
const CAMERA_NATIVE_EXTENSION: &str = "heic";

/// Declared content types that carry no type information.
const GENERIC_CONTENT_TYPES: &[&str] = &[
    "",
    "application/octet-stream",
    "binary/octet-stream",
    "application/binary",
    "application/unknown",
];

/// Content types we map ourselves before asking the MIME database.
const KNOWN_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/tiff", "tiff"),
    ("application/pdf", "pdf"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
];

/// What a payload is, for the purpose of picking a conversion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifiedKind {
    /// Vector document; the first page is rasterised.
    Document,
    /// Ordinary raster image the `image` crate decodes.
    Raster,
    /// HEIC/HEIF straight off a phone camera.
    CameraNative,
    /// Nothing we know how to convert.
    Unknown,
}

impl ClassifiedKind {
    /// Kind implied by a (lower-case, dot-less) file extension.
    ///
    /// Returns `None` for the generic extension, which needs byte inspection.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let kind = match ext.to_ascii_lowercase().as_str() {
            GENERIC_EXTENSION => return None,
            "pdf" => ClassifiedKind::Document,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tiff" | "tif" => {
                ClassifiedKind::Raster
            }
            "heic" | "heif" => ClassifiedKind::CameraNative,
            _ => ClassifiedKind::Unknown,
        };
        Some(kind)
    }
}

/// A classified staged payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ClassifiedKind,
    /// Path of the payload after any rename.
    pub path: PathBuf,
}

/// Map a declared `Content-Type` header value to a file extension.
///
/// Parameters such as `; charset=binary` are ignored. Unknown types fall
/// back to the MIME database, then to [`GENERIC_EXTENSION`].
pub fn extension_for_content_type(content_type: Option<&str>) -> String {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if GENERIC_CONTENT_TYPES.contains(&essence.as_str()) {
        return GENERIC_EXTENSION.to_string();
    }

    if let Some((_, ext)) = KNOWN_CONTENT_TYPES.iter().find(|(ct, _)| *ct == essence) {
        return (*ext).to_string();
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| (*ext).to_string())
        .unwrap_or_else(|| GENERIC_EXTENSION.to_string())
}

/// True if the file starts with [`PDF_SIGNATURE`]. Unreadable files are not PDFs.
pub fn has_pdf_signature(path: &Path) -> bool {
    let mut header = [0u8; PDF_SIGNATURE.len()];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|_| header == PDF_SIGNATURE)
        .unwrap_or(false)
}

/// Classify the staged payload at `staged`.
///
/// The declared type is read from the file's extension (as assigned by the
/// download stage). Only a generic extension triggers signature inspection;
/// the file is then renamed to the extension it was classified as.
pub fn classify(
    staged: &Path,
    policy: UnknownPayloadPolicy,
) -> Result<Classification, ConvertError> {
    let ext = staged
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(GENERIC_EXTENSION);

    if let Some(kind) = ClassifiedKind::from_extension(ext) {
        debug!("{}: declared type trusted → {:?}", staged.display(), kind);
        return Ok(Classification {
            kind,
            path: staged.to_path_buf(),
        });
    }

    let (kind, new_ext) = if has_pdf_signature(staged) {
        (ClassifiedKind::Document, "pdf")
    } else {
        match policy {
            UnknownPayloadPolicy::AssumeCameraNative => {
                (ClassifiedKind::CameraNative, CAMERA_NATIVE_EXTENSION)
            }
            UnknownPayloadPolicy::Reject => {
                debug!("{}: opaque payload rejected by policy", staged.display());
                return Ok(Classification {
                    kind: ClassifiedKind::Unknown,
                    path: staged.to_path_buf(),
                });
            }
        }
    };

    let renamed = staged.with_extension(new_ext);
    std::fs::rename(staged, &renamed).map_err(|source| ConvertError::Io {
        path: staged.to_path_buf(),
        source,
    })?;
    info!(
        "Treated opaque payload as {:?}, renamed to {}",
        kind,
        renamed.display()
    );

    Ok(Classification {
        kind,
        path: renamed,
    })
}
