//! Oro Attachments CLI
//!
//! Encode and decode attachment tokens, upload files into the configured
//! storage and inspect sizes and icons from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oa_attachments::{
    human_readable_size, token, AccessType, AttachmentManager, SourceFile, StoredFile,
};
use oa_core::config::AttachmentsConfig;

#[derive(Parser)]
#[command(name = "oro-attachments")]
#[command(about = "Attachment tokens, uploads and file helpers")]
#[command(version)]
struct Cli {
    /// Config file layered under ATTACHMENTS__* environment overrides
    #[arg(long, env = "ATTACHMENTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "ATTACHMENTS_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Access {
    Get,
    Download,
}

impl From<Access> for AccessType {
    fn from(access: Access) -> Self {
        match access {
            Access::Get => AccessType::Get,
            Access::Download => AccessType::Download,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build an attachment token
    Encode {
        parent_class: String,
        parent_id: i64,
        field_name: String,
        original_filename: String,
        #[arg(long, value_enum, default_value = "get")]
        access: Access,
    },
    /// Print the fields of an attachment token as JSON
    Decode { token: String },
    /// Format a byte count for display
    Size { bytes: u64 },
    /// Icon class for a file extension
    Icon { extension: Option<String> },
    /// Upload a local file into storage
    Upload {
        path: PathBuf,
        /// User the upload is recorded for
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Fetch a URL or local path and upload it into storage
    Fetch {
        location: String,
        #[arg(long)]
        owner: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Encode {
            parent_class,
            parent_id,
            field_name,
            original_filename,
            access,
        } => {
            let coded = token::encode(
                &parent_class,
                parent_id,
                &field_name,
                access.into(),
                &original_filename,
            );
            println!("{}", coded);
        }
        Commands::Decode { token: coded } => {
            let parts = token::decode(&coded).context("Failed to decode token")?;
            println!("{}", serde_json::to_string_pretty(&parts)?);
        }
        Commands::Size { bytes } => println!("{}", human_readable_size(bytes)),
        Commands::Icon { extension } => {
            let manager = AttachmentManager::from_config(&config)?;
            let mut file = StoredFile::new();
            file.extension = extension;
            println!("{}", manager.icon_class(&file));
        }
        Commands::Upload { path, owner } => {
            let manager = AttachmentManager::from_config(&config)?;
            let mut file = StoredFile::new().with_source(SourceFile::local(&path));
            manager
                .pre_upload(&mut file, owner)
                .await
                .with_context(|| format!("Failed to prepare {}", path.display()))?;
            finish_upload(&manager, &file).await?;
        }
        Commands::Fetch { location, owner } => {
            let manager = AttachmentManager::from_config(&config)?;
            let file = manager
                .prepare_remote_file(&location, owner)
                .await
                .with_context(|| format!("Failed to fetch {}", location))?;
            let uploaded = finish_upload(&manager, &file).await;
            manager.remove_staged_file(&location, &file).await?;
            uploaded?;
        }
    }

    Ok(())
}

async fn finish_upload(manager: &AttachmentManager, file: &StoredFile) -> Result<()> {
    let written = manager
        .upload(file)
        .await?
        .context("Source is not a regular file")?;

    info!(
        filename = file.filename.as_deref().unwrap_or_default(),
        storage = manager.storage().name(),
        size = %human_readable_size(written),
        "Uploaded attachment"
    );
    println!("{}", serde_json::to_string_pretty(file)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<AttachmentsConfig> {
    match path {
        Some(path) => AttachmentsConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => AttachmentsConfig::from_env().or_else(|e| {
            tracing::warn!("Failed to load config from env: {}, using defaults", e);
            Ok(AttachmentsConfig::default())
        }),
    }
}

/// Logs go to stderr so command output stays pipeable
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,oa_attachments=debug,oa_core=debug".into());

    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_encode() {
        let cli = Cli::try_parse_from([
            "oro-attachments",
            "encode",
            "A",
            "1",
            "f",
            "x.txt",
            "--access",
            "download",
        ])
        .unwrap();

        match cli.command {
            Commands::Encode {
                parent_id, access, ..
            } => {
                assert_eq!(parent_id, 1);
                assert_eq!(AccessType::from(access), AccessType::Download);
            }
            _ => panic!("expected encode"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_access() {
        let result = Cli::try_parse_from([
            "oro-attachments",
            "encode",
            "A",
            "1",
            "f",
            "x.txt",
            "--access",
            "stream",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attachments.toml");
        std::fs::write(&path, "[storage]\nbackend = \"memory\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(
            config.storage.backend,
            oa_core::config::StorageBackend::Memory
        );
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
