//! Upload intake
//!
//! Turns the three request shapes (multipart spooled to disk, in-memory
//! buffer, base64 JSON field) into one [`UploadDescriptor`]. Rejections are
//! 400s and never reach storage. A spooled temp file is owned by a
//! [`TempFileGuard`] from the moment it is created, so every early return
//! removes it.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use twin_common::cleanup::remove_file_quietly_blocking;
use twin_common::{decode_strict, remove_file_quietly, Base64Error};

use super::{AssetKind, AssetManagerConfig};
use crate::error::AppError;
use crate::features::shared::validation::{
    coerce_bool, required_text, validate_length, validate_url, FieldError, MAX_TEXT_LENGTH,
};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("A file is required")]
    MissingFile,

    #[error("Filename could not be determined")]
    MissingFilename,

    #[error("Invalid file type: expected a {expected} file")]
    WrongExtension { expected: String },

    #[error("Unsupported content type '{0}'")]
    UnsupportedMimeType(String),

    #[error("Invalid base64 file data: {0}")]
    InvalidBase64(#[from] Base64Error),

    #[error("Invalid GeoJSON: {0}")]
    InvalidGeoJson(String),

    #[error("Failed to read uploaded file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Io(e) => AppError::Io(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

/// Deletes a temp file on drop unless ownership was handed off.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transfer responsibility for the file to someone else (the upload job).
    pub fn hand_off(mut self) {
        self.armed = false;
    }

    /// Remove the file now, without blocking the runtime.
    pub async fn cleanup(mut self) {
        if self.armed {
            remove_file_quietly(&self.path).await;
            self.armed = false;
        }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            remove_file_quietly_blocking(&self.path);
        }
    }
}

/// File part of a request, before validation
#[derive(Debug)]
pub enum RawFile {
    Disk {
        guard: TempFileGuard,
        size: u64,
        file_name: Option<String>,
        content_type: Option<String>,
    },
    Memory {
        bytes: Vec<u8>,
        file_name: Option<String>,
        content_type: Option<String>,
    },
    Base64(String),
}

impl RawFile {
    fn declared_name(&self) -> Option<&str> {
        match self {
            RawFile::Disk { file_name, .. } | RawFile::Memory { file_name, .. } => {
                file_name.as_deref().filter(|n| !n.trim().is_empty())
            },
            RawFile::Base64(_) => None,
        }
    }

    fn declared_type(&self) -> Option<&str> {
        match self {
            RawFile::Disk { content_type, .. } | RawFile::Memory { content_type, .. } => {
                content_type.as_deref()
            },
            RawFile::Base64(_) => None,
        }
    }
}

/// Unvalidated upload fields
#[derive(Debug, Default)]
pub struct RawUpload {
    pub description: Option<String>,
    pub source: Option<String>,
    pub filename: Option<String>,
    pub is_public: Option<Value>,
    pub file: Option<RawFile>,
}

#[derive(Debug)]
pub enum UploadPayload {
    TempFile { guard: TempFileGuard, size: u64 },
    Buffer(Vec<u8>),
}

impl UploadPayload {
    pub fn size(&self) -> u64 {
        match self {
            UploadPayload::TempFile { size, .. } => *size,
            UploadPayload::Buffer(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_disk_backed(&self) -> bool {
        matches!(self, UploadPayload::TempFile { .. })
    }

    /// Load the payload into memory. A temp file is removed after reading.
    pub async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            UploadPayload::TempFile { guard, .. } => {
                let data = tokio::fs::read(guard.path()).await;
                guard.cleanup().await;
                data
            },
            UploadPayload::Buffer(bytes) => Ok(bytes),
        }
    }
}

/// A validated upload
#[derive(Debug)]
pub struct UploadDescriptor {
    pub description: String,
    pub source: String,
    pub filename: String,
    pub is_public: bool,
    pub content_type: String,
    pub payload: UploadPayload,
}

/// Validate `raw` against the rules of one manager.
pub fn validate(raw: RawUpload, config: &AssetManagerConfig) -> Result<UploadDescriptor, IntakeError> {
    let description = required_text(raw.description, "description")?;
    validate_length(&description, "description", MAX_TEXT_LENGTH)?;

    let source = required_text(raw.source, "source")?;
    validate_url(&source, "source")?;

    let file = raw.file.ok_or(IntakeError::MissingFile)?;

    let filename = raw
        .filename
        .filter(|f| !f.trim().is_empty())
        .or_else(|| file.declared_name().map(str::to_string))
        .ok_or(IntakeError::MissingFilename)?;

    check_extension(&filename, config.extension.as_deref())?;

    let declared_type = file.declared_type().map(str::to_string);
    if let Some(ref declared) = declared_type {
        check_mime_type(declared, &config.accepted_mime_types)?;
    }
    let content_type = resolve_content_type(declared_type.as_deref(), config);

    let payload = match file {
        RawFile::Disk { guard, size, .. } => {
            if size == 0 {
                return Err(IntakeError::MissingFile);
            }
            UploadPayload::TempFile { guard, size }
        },
        RawFile::Memory { bytes, .. } => {
            if bytes.is_empty() {
                return Err(IntakeError::MissingFile);
            }
            UploadPayload::Buffer(bytes)
        },
        RawFile::Base64(encoded) => UploadPayload::Buffer(decode_strict(&encoded)?),
    };

    if let UploadPayload::Buffer(ref bytes) = payload {
        validate_content(config.kind, bytes)?;
    }

    let is_public = raw.is_public.as_ref().map(coerce_bool).unwrap_or(true);

    Ok(UploadDescriptor {
        description,
        source,
        filename,
        is_public,
        content_type,
        payload,
    })
}

/// Kind-specific content checks that need the payload bytes.
pub fn validate_content(kind: AssetKind, bytes: &[u8]) -> Result<(), IntakeError> {
    match kind {
        AssetKind::MapLayer => validate_geojson(bytes),
        AssetKind::SimpleAsset | AssetKind::Tileset => Ok(()),
    }
}

fn validate_geojson(bytes: &[u8]) -> Result<(), IntakeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| IntakeError::InvalidGeoJson(e.to_string()))?;

    match value.get("type") {
        Some(Value::String(_)) if value.is_object() => Ok(()),
        _ => Err(IntakeError::InvalidGeoJson(
            "expected an object with a string \"type\" member".to_string(),
        )),
    }
}

fn check_extension(filename: &str, extension: Option<&str>) -> Result<(), IntakeError> {
    let Some(extension) = extension else {
        return Ok(());
    };

    if filename.to_lowercase().ends_with(&extension.to_lowercase()) {
        Ok(())
    } else {
        Err(IntakeError::WrongExtension {
            expected: extension.to_string(),
        })
    }
}

fn check_mime_type(declared: &str, accepted: &[String]) -> Result<(), IntakeError> {
    let mime: mime::Mime = declared
        .parse()
        .map_err(|_| IntakeError::UnsupportedMimeType(declared.to_string()))?;

    if mime.essence_str() == mime::APPLICATION_OCTET_STREAM.essence_str() || accepted.is_empty() {
        return Ok(());
    }

    if accepted.iter().any(|a| a.eq_ignore_ascii_case(mime.essence_str())) {
        Ok(())
    } else {
        Err(IntakeError::UnsupportedMimeType(declared.to_string()))
    }
}

fn resolve_content_type(declared: Option<&str>, config: &AssetManagerConfig) -> String {
    if config.kind != AssetKind::SimpleAsset {
        return config.content_type.clone();
    }

    declared
        .and_then(|d| d.parse::<mime::Mime>().ok())
        .filter(|m| m.essence_str() != mime::APPLICATION_OCTET_STREAM.essence_str())
        .map(|m| m.to_string())
        .unwrap_or_else(|| config.content_type.clone())
}
