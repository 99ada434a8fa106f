//! Attachment Model
//!
//! The stored file record, its pending source file and the descriptor that
//! attachment tokens are built from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use oa_core::traits::{Id, Identifiable};
use serde::{Deserialize, Serialize};

/// How a tokenized attachment link is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Inline display
    #[default]
    Get,
    /// Forced download
    Download,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Download => "download",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "get" => Some(Self::Get),
            "download" => Some(Self::Download),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fields an attachment token locates a file by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    /// Class of the entity owning the attachment field
    pub parent_class: String,
    /// Id of the owning entity
    pub parent_id: Id,
    /// Attachment field on the owning entity
    pub field_name: String,
    pub access: AccessType,
    pub original_filename: String,
}

impl AttachmentDescriptor {
    pub fn new(
        parent_class: impl Into<String>,
        parent_id: Id,
        field_name: impl Into<String>,
        access: AccessType,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            parent_class: parent_class.into(),
            parent_id,
            field_name: field_name.into(),
            access,
            original_filename: original_filename.into(),
        }
    }
}

/// A local file waiting to be uploaded into storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFile {
    /// File received from a client upload; name, type and size are the
    /// values the client reported.
    Uploaded {
        path: PathBuf,
        client_original_name: String,
        client_mime_type: Option<String>,
        client_size: Option<u64>,
    },
    /// Plain file on local disk; everything is derived from the file itself.
    Local { path: PathBuf },
}

impl SourceFile {
    pub fn uploaded(path: impl Into<PathBuf>, client_original_name: impl Into<String>) -> Self {
        Self::Uploaded {
            path: path.into(),
            client_original_name: client_original_name.into(),
            client_mime_type: None,
            client_size: None,
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Uploaded { path, .. } | Self::Local { path } => path,
        }
    }

    /// Name the file should be presented under
    pub fn display_name(&self) -> Option<String> {
        match self {
            Self::Uploaded {
                client_original_name,
                ..
            } => Some(client_original_name.clone()),
            Self::Local { path } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    /// Whether the path points at an existing regular file
    pub async fn is_file(&self) -> bool {
        tokio::fs::metadata(self.path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }
}

/// A stored attachment record.
///
/// Persistence belongs to the caller; the manager only mutates these fields
/// and the blob stored under `filename`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Option<Id>,
    /// Generated storage key (unique token plus extension)
    pub filename: Option<String>,
    pub extension: Option<String>,
    pub original_filename: Option<String>,
    pub mime_type: Option<String>,
    /// File size in bytes
    pub file_size: Option<u64>,
    /// User that uploaded the current file
    pub owner_id: Option<Id>,
    /// Set when the user cleared the file in a form
    pub empty_file: bool,
    /// Pending local file, not persisted
    #[serde(skip)]
    pub source: Option<SourceFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StoredFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StoredFile {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: None,
            filename: None,
            extension: None,
            original_filename: None,
            mime_type: None,
            file_size: None,
            owner_id: None,
            empty_file: false,
            source: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a pending source file
    pub fn with_source(mut self, source: SourceFile) -> Self {
        self.source = Some(source);
        self
    }

    /// Mark the record as cleared
    pub fn mark_empty(mut self) -> Self {
        self.empty_file = true;
        self
    }

    pub fn is_empty_file(&self) -> bool {
        self.empty_file
    }

    /// Check if this is an image
    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|mime| mime.starts_with("image/"))
            .unwrap_or(false)
    }

    /// Drop the name fields of a cleared file
    pub(crate) fn clear_names(&mut self) {
        self.filename = None;
        self.extension = None;
        self.original_filename = None;
        self.updated_at = Utc::now();
    }
}

impl Identifiable for StoredFile {
    fn id(&self) -> Option<Id> {
        self.id
    }
}
