//! # oa-attachments
//!
//! File attachment handling for Oro Attachments RS.
//!
//! ## Features
//!
//! - Attachment link tokens (encode/decode)
//! - Storage abstraction (local filesystem, in-memory) with chunked uploads
//! - Upload preparation for client uploads, local files and remote URLs
//! - Human-readable sizes and file type icons
//!
//! ## Example
//!
//! ```rust,ignore
//! use oa_attachments::{AttachmentManager, SourceFile, StoredFile};
//! use oa_core::config::AttachmentsConfig;
//!
//! let manager = AttachmentManager::from_config(&AttachmentsConfig::default())?;
//!
//! let mut file = StoredFile::new().with_source(SourceFile::local("/tmp/report.pdf"));
//! manager.pre_upload(&mut file, Some(user_id)).await?;
//! manager.upload(&file).await?;
//!
//! let url = manager.file_url(&contact, "resume", &file, AccessType::Download, false)?;
//! ```

pub mod copy;
pub mod error;
pub mod format;
pub mod links;
pub mod manager;
pub mod model;
pub mod remote;
pub mod storage;
pub mod store;
pub mod token;

pub use copy::{copy_chunked, copy_file_to_storage, READ_COUNT};
pub use error::{AttachmentError, AttachmentResult};
pub use format::{human_readable_size, IconMap};
pub use links::{LinkError, LinkGenerator, RouteParams, RouteTable};
pub use manager::{AttachmentManager, DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_WIDTH};
pub use model::{AccessType, AttachmentDescriptor, SourceFile, StoredFile};
pub use remote::RemoteFetchError;
pub use storage::{
    build_storage, generate_storage_filename, BlobWriter, LocalStorage, MemoryStorage,
    MetadataSupport, ObjectMetadata, Storage, StorageError, StorageResult,
};
pub use store::{FileRecordStore, MemoryFileStore};
pub use token::{InvalidToken, TokenParts};
