//! Configuration types and loading
//!
//! Defaults cover a working local setup; `from_env` and `from_file` layer
//! overrides on top of them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Route name used for attachment download links
pub const ROUTE_ATTACHMENT_FILE: &str = "oro_attachment_file";
/// Route name used for resized image links
pub const ROUTE_RESIZE_ATTACHMENT: &str = "oro_resize_attachment";
/// Route name used for filtered image links
pub const ROUTE_FILTERED_ATTACHMENT: &str = "oro_filtered_attachment";

/// Main attachments configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttachmentsConfig {
    /// Blob storage configuration
    pub storage: StorageConfig,

    /// Upload staging configuration
    pub upload: UploadConfig,

    /// File type icons
    pub icons: IconConfig,

    /// Link generation
    pub links: LinkConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the local disk backend
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Preferred directory for staging remote files.
    /// Falls back to the system temp dir when unset, missing or read-only.
    pub tmp_dir: Option<String>,
    /// Timeout for fetching remote files
    pub remote_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IconConfig {
    /// Icon class used for extensions without a mapping
    pub default: String,
    /// Extension (lowercase, no dot) -> icon class
    pub extensions: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Scheme and host prepended to absolute links
    pub base_url: String,
    /// Route name -> path template with `{param}` placeholders
    pub routes: HashMap<String, String>,
}

impl Default for IconConfig {
    fn default() -> Self {
        let extensions = [
            ("doc", "icon-file-text"),
            ("docx", "icon-file-text"),
            ("txt", "icon-file-text"),
            ("pdf", "icon-file-text"),
            ("xls", "icon-table"),
            ("xlsx", "icon-table"),
            ("csv", "icon-table"),
            ("jpg", "icon-picture"),
            ("jpeg", "icon-picture"),
            ("png", "icon-picture"),
            ("gif", "icon-picture"),
            ("zip", "icon-archive"),
            ("gz", "icon-archive"),
        ]
        .into_iter()
        .map(|(ext, icon)| (ext.to_string(), icon.to_string()))
        .collect();

        Self {
            default: "icon-file".to_string(),
            extensions,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        let routes = [
            (ROUTE_ATTACHMENT_FILE, "/attachment/{codedString}.{extension}"),
            (
                ROUTE_RESIZE_ATTACHMENT,
                "/attachment/resize/{id}/{width}/{height}/{filename}",
            ),
            (
                ROUTE_FILTERED_ATTACHMENT,
                "/media/cache/attachment/resize/{filter}/{id}/{filename}",
            ),
        ]
        .into_iter()
        .map(|(name, template)| (name.to_string(), template.to_string()))
        .collect();

        Self {
            base_url: "http://localhost".to_string(),
            routes,
        }
    }
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_path: "var/attachment".to_string(),
            },
            upload: UploadConfig {
                tmp_dir: None,
                remote_timeout_seconds: 30,
            },
            icons: IconConfig::default(),
            links: LinkConfig::default(),
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config file error: {0}")]
    FileError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::FileError(err.to_string())
    }
}

impl AttachmentsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("ATTACHMENTS_STORAGE_BACKEND") {
            config.storage.backend = parse_backend(&backend)?;
        }
        if let Ok(path) = std::env::var("ATTACHMENTS_STORAGE_PATH") {
            config.storage.local_path = path;
        }
        if let Ok(dir) = std::env::var("ATTACHMENTS_UPLOAD_TMP_DIR") {
            config.upload.tmp_dir = Some(dir);
        }
        if let Ok(secs) = std::env::var("ATTACHMENTS_REMOTE_TIMEOUT") {
            config.upload.remote_timeout_seconds =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "ATTACHMENTS_REMOTE_TIMEOUT".to_string(),
                    message: format!("expected seconds, got {:?}", secs),
                })?;
        }
        if let Ok(url) = std::env::var("ATTACHMENTS_BASE_URL") {
            config.links.base_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a file (format inferred from its extension),
    /// layered over the defaults and under `ATTACHMENTS__*` env overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileError(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("ATTACHMENTS").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        tracing::debug!(path = %path.display(), backend = ?config.storage.backend, "Loaded attachments config");
        Ok(config)
    }
}

fn parse_backend(value: &str) -> Result<StorageBackend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "local" => Ok(StorageBackend::Local),
        "memory" => Ok(StorageBackend::Memory),
        other => Err(ConfigError::InvalidValue {
            key: "ATTACHMENTS_STORAGE_BACKEND".to_string(),
            message: format!("unknown backend {:?}", other),
        }),
    }
}
