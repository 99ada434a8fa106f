//! Attachment Manager
//!
//! Prepares stored file records for upload, streams their bytes into
//! storage and builds the links attachments are served under.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use oa_core::config::{
    AttachmentsConfig, ROUTE_ATTACHMENT_FILE, ROUTE_FILTERED_ATTACHMENT, ROUTE_RESIZE_ATTACHMENT,
};
use oa_core::traits::{Id, ParentEntity};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

use crate::copy::copy_file_to_storage;
use crate::error::{AttachmentError, AttachmentResult};
use crate::format::IconMap;
use crate::links::{LinkGenerator, RouteParams, RouteTable};
use crate::model::{AccessType, SourceFile, StoredFile};
use crate::remote::{is_staged_copy, stage_file, RemoteFetchError};
use crate::storage::{build_storage, generate_storage_filename, ObjectMetadata, Storage};
use crate::store::FileRecordStore;
use crate::token::{self, TokenParts};

pub const DEFAULT_IMAGE_WIDTH: u32 = 100;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 100;

/// Leading bytes inspected for content sniffing
const SNIFF_LEN: u64 = 8192;

/// Attachment manager
pub struct AttachmentManager {
    storage: Arc<dyn Storage>,
    links: Arc<dyn LinkGenerator>,
    icons: IconMap,
    upload_tmp_dir: Option<PathBuf>,
    http: reqwest::Client,
}

impl AttachmentManager {
    pub fn new(storage: Arc<dyn Storage>, links: Arc<dyn LinkGenerator>, icons: IconMap) -> Self {
        Self {
            storage,
            links,
            icons,
            upload_tmp_dir: None,
            http: reqwest::Client::new(),
        }
    }

    /// Build a manager with the configured storage, routes and icons
    pub fn from_config(config: &AttachmentsConfig) -> AttachmentResult<Self> {
        let storage = build_storage(&config.storage);
        Self::with_storage(storage, config)
    }

    /// Build a manager over an existing storage backend
    pub fn with_storage(
        storage: Arc<dyn Storage>,
        config: &AttachmentsConfig,
    ) -> AttachmentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upload.remote_timeout_seconds))
            .build()
            .map_err(|e| AttachmentError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            storage,
            links: Arc::new(RouteTable::from_config(&config.links)),
            icons: IconMap::from_config(&config.icons),
            upload_tmp_dir: config.upload.tmp_dir.as_ref().map(PathBuf::from),
            http,
        })
    }

    /// Prefer this directory when staging remote files
    pub fn with_upload_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_tmp_dir = Some(dir.into());
        self
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Stage a remote or local file and prepare it as a new attachment.
    ///
    /// Every failure along the way comes back as a [`RemoteFetchError`];
    /// nothing is retried.
    pub async fn prepare_remote_file(
        &self,
        location: &str,
        owner: Option<Id>,
    ) -> Result<StoredFile, RemoteFetchError> {
        let result = self.stage_and_prepare(location, owner).await;
        if let Err(ref e) = result {
            warn!(location, error = %e, "Remote file could not be prepared");
        }
        result
    }

    async fn stage_and_prepare(
        &self,
        location: &str,
        owner: Option<Id>,
    ) -> Result<StoredFile, RemoteFetchError> {
        let staged = stage_file(&self.http, location, self.upload_tmp_dir.as_deref()).await?;

        let mut file = StoredFile::new().with_source(SourceFile::local(staged));
        self.pre_upload(&mut file, owner)
            .await
            .map_err(|e| RemoteFetchError::Prepare(e.to_string()))?;

        Ok(file)
    }

    /// Delete the staged copy behind a record built by
    /// [`prepare_remote_file`](Self::prepare_remote_file). A source that was
    /// used in place is left alone.
    pub async fn remove_staged_file(&self, location: &str, file: &StoredFile) -> AttachmentResult<()> {
        let Some(staged) = file.source.as_ref().map(SourceFile::path) else {
            return Ok(());
        };
        if !is_staged_copy(location, staged).await {
            return Ok(());
        }

        match fs::remove_file(staged).await {
            Ok(()) => {
                debug!(path = ?staged, "Removed staged file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Update a record before its source file is uploaded.
    ///
    /// A cleared record loses its blob and name fields. A record with a
    /// pending source file gets the owner, a fresh storage filename and the
    /// source's name, type and size; the blob under the old filename is
    /// removed first.
    #[instrument(skip(self, file), fields(storage = self.storage.name(), id = ?file.id))]
    pub async fn pre_upload(&self, file: &mut StoredFile, owner: Option<Id>) -> AttachmentResult<()> {
        if file.is_empty_file() {
            if let Some(old) = file.filename.as_deref() {
                self.delete_blob(old).await?;
            }
            file.clear_names();
        }

        let source = match file.source.clone() {
            Some(source) => source,
            None => return Ok(()),
        };
        if !source.is_file().await {
            return Ok(());
        }

        file.owner_id = owner;
        if let Some(old) = file.filename.as_deref() {
            self.delete_blob(old).await?;
        }

        let sniffed = sniff(source.path()).await?;
        let (original_name, mime_type, size) = match &source {
            SourceFile::Uploaded {
                path,
                client_original_name,
                client_mime_type,
                client_size,
            } => {
                let mime = client_mime_type
                    .clone()
                    .unwrap_or_else(|| guess_mime(sniffed, Path::new(client_original_name)));
                let size = match client_size {
                    Some(size) => *size,
                    None => fs::metadata(path).await?.len(),
                };
                (client_original_name.clone(), mime, size)
            }
            SourceFile::Local { path } => (
                source.display_name().unwrap_or_default(),
                guess_mime(sniffed, path),
                fs::metadata(path).await?.len(),
            ),
        };

        let extension = guess_extension(sniffed, &original_name, &mime_type);
        let filename = generate_storage_filename(extension.as_deref());

        file.extension = extension;
        file.original_filename = Some(original_name);
        file.mime_type = Some(mime_type.clone());
        file.file_size = Some(size);
        file.filename = Some(filename.clone());
        file.updated_at = Utc::now();

        if let Some(meta) = self.storage.metadata_support() {
            let mut tags = ObjectMetadata::new();
            tags.insert("contentType".to_string(), mime_type);
            meta.set_metadata(&filename, tags).await?;
        }

        info!(filename = %filename, size, "Attachment prepared for upload");
        Ok(())
    }

    /// Copy the pending source file into storage.
    ///
    /// Returns the number of bytes written, or `None` when there is no
    /// source file to upload.
    pub async fn upload(&self, file: &StoredFile) -> AttachmentResult<Option<u64>> {
        let source = match &file.source {
            Some(source) => source,
            None => return Ok(None),
        };
        if !source.is_file().await {
            return Ok(None);
        }
        let key = file.filename.as_deref().ok_or_else(|| {
            AttachmentError::InvalidFile("no storage filename assigned, run pre_upload first".into())
        })?;

        let bytes = self.copy_local_file_to_storage(source.path(), key).await?;
        Ok(Some(bytes))
    }

    /// Stream a local file into storage under `key`
    pub async fn copy_local_file_to_storage(
        &self,
        local_path: &Path,
        key: &str,
    ) -> AttachmentResult<u64> {
        Ok(copy_file_to_storage(self.storage.as_ref(), local_path, key).await?)
    }

    /// Stored bytes of a file
    pub async fn content(&self, file: &StoredFile) -> AttachmentResult<Bytes> {
        let key = file
            .filename
            .as_deref()
            .ok_or_else(|| AttachmentError::NotFound("file has no stored content".into()))?;
        Ok(self.storage.get(key).await?)
    }

    /// Link to an attachment field of a parent entity
    pub fn file_url(
        &self,
        parent: &dyn ParentEntity,
        field_name: &str,
        file: &StoredFile,
        access: AccessType,
        absolute: bool,
    ) -> AttachmentResult<String> {
        self.attachment_url(
            parent.entity_class(),
            parent.entity_id(),
            field_name,
            file,
            access,
            absolute,
        )
    }

    pub fn attachment_url(
        &self,
        parent_class: &str,
        parent_id: Id,
        field_name: &str,
        file: &StoredFile,
        access: AccessType,
        absolute: bool,
    ) -> AttachmentResult<String> {
        let coded = token::encode(
            parent_class,
            parent_id,
            field_name,
            access,
            file.original_filename.as_deref().unwrap_or_default(),
        );

        let mut params = RouteParams::new();
        params.insert("codedString".to_string(), coded);
        params.insert(
            "extension".to_string(),
            file.extension.clone().unwrap_or_default(),
        );

        Ok(self.links.generate(ROUTE_ATTACHMENT_FILE, &params, absolute)?)
    }

    /// Fields of an attachment link token
    pub fn decode_attachment_url(&self, coded: &str) -> AttachmentResult<TokenParts> {
        let parts = token::decode(coded)?;
        debug!(parent_class = %parts.parent_class, field = %parts.field_name, "Decoded attachment token");
        Ok(parts)
    }

    /// Link to a resized copy of an image attachment
    pub fn resized_image_url(
        &self,
        file: &StoredFile,
        width: u32,
        height: u32,
    ) -> AttachmentResult<String> {
        let mut params = image_params(file)?;
        params.insert("width".to_string(), width.to_string());
        params.insert("height".to_string(), height.to_string());

        Ok(self.links.generate(ROUTE_RESIZE_ATTACHMENT, &params, false)?)
    }

    /// Resized image link at the default thumbnail size
    pub fn thumbnail_url(&self, file: &StoredFile) -> AttachmentResult<String> {
        self.resized_image_url(file, DEFAULT_IMAGE_WIDTH, DEFAULT_IMAGE_HEIGHT)
    }

    /// Link to an image attachment with a named image filter applied
    pub fn filtered_image_url(&self, file: &StoredFile, filter: &str) -> AttachmentResult<String> {
        let mut params = image_params(file)?;
        params.insert("filter".to_string(), filter.to_string());

        Ok(self.links.generate(ROUTE_FILTERED_ATTACHMENT, &params, false)?)
    }

    /// Icon class for a file's extension
    pub fn icon_class(&self, file: &StoredFile) -> &str {
        self.icons.icon_class(file.extension.as_deref())
    }

    /// Remove a cleared record that never got a file.
    ///
    /// Returns whether the record was removed.
    pub async fn check_on_delete(
        &self,
        file: &StoredFile,
        store: &dyn FileRecordStore,
    ) -> AttachmentResult<bool> {
        if file.is_empty_file() && file.filename.is_none() {
            store.remove(file).await?;
            debug!(id = ?file.id, "Removed empty attachment record");
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_blob(&self, key: &str) -> AttachmentResult<()> {
        if self.storage.exists(key).await? {
            self.storage.delete(key).await?;
            debug!(key, "Deleted previous blob");
        }
        Ok(())
    }
}

fn image_params(file: &StoredFile) -> AttachmentResult<RouteParams> {
    let id = file
        .id
        .ok_or_else(|| AttachmentError::InvalidFile("file has not been saved".into()))?;

    let mut params = RouteParams::new();
    params.insert("id".to_string(), id.to_string());
    params.insert(
        "filename".to_string(),
        file.original_filename.clone().unwrap_or_default(),
    );
    Ok(params)
}

/// Detect the file type from its leading bytes
async fn sniff(path: &Path) -> AttachmentResult<Option<infer::Type>> {
    let file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut head).await?;
    Ok(infer::get(&head))
}

fn guess_mime(sniffed: Option<infer::Type>, name: &Path) -> String {
    match sniffed {
        Some(kind) => kind.mime_type().to_string(),
        None => mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string(),
    }
}

/// Extension from content, then the file name, then the MIME type
fn guess_extension(sniffed: Option<infer::Type>, name: &str, mime_type: &str) -> Option<String> {
    if let Some(kind) = sniffed {
        return Some(kind.extension().to_string());
    }

    let from_name = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .map(|ext| ext.to_ascii_lowercase());
    if from_name.is_some() {
        return from_name;
    }

    mime_guess::get_mime_extensions_str(mime_type)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}
