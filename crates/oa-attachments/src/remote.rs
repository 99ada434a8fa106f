//! Remote file staging
//!
//! Copies a file given by URL (HTTP(S), `file://` or a plain local path) into
//! a temp directory so it can be uploaded like any other local file.

use std::io;
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::copy::{copy_chunked, READ_COUNT};

/// Why a remote file could not be turned into an attachment
#[derive(Debug, Error)]
pub enum RemoteFetchError {
    #[error("Cannot derive a file name from {0:?}")]
    NoFileName(String),
    #[error("Fetching {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Staging {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Preparing staged file failed: {0}")]
    Prepare(String),
}

impl RemoteFetchError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| RemoteFetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

enum Origin {
    Http(Url),
    Local(PathBuf),
}

fn parse_origin(location: &str) -> Origin {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Origin::Http(url),
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(Origin::Local)
            .unwrap_or_else(|_| Origin::Local(PathBuf::from(location))),
        _ => Origin::Local(PathBuf::from(location)),
    }
}

/// File name a location is staged under: its last path segment, without
/// query string or fragment.
pub fn file_name_from_location(location: &str) -> Option<String> {
    let path = location
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let name = path.rsplit(|c: char| c == '/' || c == '\\').next()?;
    let name = urlencoding::decode(name)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| name.to_string());

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}

/// Directory to stage files in: the preferred one when it is an existing
/// directory the process can create files in, otherwise the system temp dir.
pub async fn staging_dir(preferred: Option<&Path>) -> PathBuf {
    if let Some(dir) = preferred {
        if is_writable_dir(dir).await {
            return dir.to_path_buf();
        }
        debug!(dir = ?dir, "Upload temp dir unusable, using system temp dir");
    }
    std::env::temp_dir()
}

/// Whether a scratch file can be created (and removed) in `dir`
async fn is_writable_dir(dir: &Path) -> bool {
    match fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return false,
    }

    let check = dir.join(format!(".write-check-{}", Uuid::new_v4().simple()));
    let created = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&check)
        .await;

    match created {
        Ok(file) => {
            drop(file);
            if let Err(e) = fs::remove_file(&check).await {
                warn!(path = ?check, error = %e, "Failed to remove write check file");
            }
            true
        }
        Err(_) => false,
    }
}

/// Copy `location` into the staging directory and return the staged path.
#[instrument(skip(client))]
pub async fn stage_file(
    client: &reqwest::Client,
    location: &str,
    preferred_dir: Option<&Path>,
) -> Result<PathBuf, RemoteFetchError> {
    let name = file_name_from_location(location)
        .ok_or_else(|| RemoteFetchError::NoFileName(location.to_string()))?;

    let dir = staging_dir(preferred_dir).await;
    let dir = fs::canonicalize(&dir)
        .await
        .map_err(RemoteFetchError::io(&dir))?;
    let target = dir.join(name);

    match parse_origin(location) {
        Origin::Http(url) => fetch_http(client, url, &target).await?,
        Origin::Local(path) => {
            let source = fs::canonicalize(&path)
                .await
                .map_err(RemoteFetchError::io(&path))?;
            // Copying a file onto itself truncates it
            if source == target {
                debug!(path = ?source, "File already staged, using it in place");
                return Ok(source);
            }
            fs::copy(&source, &target)
                .await
                .map_err(RemoteFetchError::io(&source))?;
        }
    }

    debug!(target = ?target, "Staged file");
    Ok(target)
}

/// Whether `staged` is a copy made by [`stage_file`] for `location`, as
/// opposed to the source file itself used in place.
pub async fn is_staged_copy(location: &str, staged: &Path) -> bool {
    match parse_origin(location) {
        Origin::Http(_) => true,
        Origin::Local(path) => match fs::canonicalize(&path).await {
            Ok(source) => source != staged,
            Err(_) => false,
        },
    }
}

async fn fetch_http(
    client: &reqwest::Client,
    url: Url,
    target: &Path,
) -> Result<(), RemoteFetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|source| RemoteFetchError::Http {
            url: url.to_string(),
            source,
        })?;

    let body = response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let reader = StreamReader::new(body);
    tokio::pin!(reader);

    let mut file = fs::File::create(target)
        .await
        .map_err(RemoteFetchError::io(target))?;
    let copied = copy_chunked(&mut reader, &mut file, READ_COUNT).await;
    let closed = file.shutdown().await;
    drop(file);

    if let Err(e) = copied.and(closed) {
        if let Err(remove_err) = fs::remove_file(target).await {
            warn!(path = ?target, error = %remove_err, "Failed to remove partial download");
        }
        return Err(RemoteFetchError::Io {
            path: target.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns its base URL
    async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let declared = body.len();
        serve_declared(status, body, declared).await
    }

    /// Like `serve_once`, but announces `declared` bytes in Content-Length
    async fn serve_declared(status: &'static str, body: Vec<u8>, declared: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status, declared
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_file_name_from_location() {
        assert_eq!(
            file_name_from_location("https://cdn.example.com/img/logo.png?v=3").as_deref(),
            Some("logo.png")
        );
        assert_eq!(
            file_name_from_location("http://example.com/files/my%20cv.pdf#page=2").as_deref(),
            Some("my cv.pdf")
        );
        assert_eq!(
            file_name_from_location("/var/data/report.csv").as_deref(),
            Some("report.csv")
        );
        assert_eq!(file_name_from_location("plain.txt").as_deref(), Some("plain.txt"));
        assert_eq!(file_name_from_location("https://example.com/"), None);
        assert_eq!(file_name_from_location("/var/data/.."), None);
        assert_eq!(file_name_from_location("?only=query"), None);
    }

    #[tokio::test]
    async fn test_staging_dir_prefers_configured() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(staging_dir(Some(dir.path())).await, dir.path());
    }

    #[tokio::test]
    async fn test_staging_dir_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert_eq!(staging_dir(Some(&missing)).await, std::env::temp_dir());
        assert_eq!(staging_dir(None).await, std::env::temp_dir());
    }

    #[tokio::test]
    async fn test_stage_local_file() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("notes.txt");
        std::fs::write(&source, b"remember the milk").unwrap();
        let staging = tempfile::tempdir().unwrap();

        let staged = stage_file(
            &reqwest::Client::new(),
            source.to_str().unwrap(),
            Some(staging.path()),
        )
        .await
        .unwrap();

        assert_eq!(staged.file_name().unwrap(), "notes.txt");
        assert!(staged.starts_with(std::fs::canonicalize(staging.path()).unwrap()));
        assert_eq!(std::fs::read(&staged).unwrap(), b"remember the milk");
    }

    #[tokio::test]
    async fn test_stage_file_already_in_staging_dir() {
        let staging = tempfile::tempdir().unwrap();
        let source = staging.path().join("notes.txt");
        std::fs::write(&source, b"remember the milk").unwrap();

        let staged = stage_file(
            &reqwest::Client::new(),
            source.to_str().unwrap(),
            Some(staging.path()),
        )
        .await
        .unwrap();

        assert_eq!(staged, std::fs::canonicalize(&source).unwrap());
        assert_eq!(std::fs::read(&staged).unwrap(), b"remember the milk");
    }

    #[tokio::test]
    async fn test_is_staged_copy() {
        let source_dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let outside = source_dir.path().join("a.txt");
        let inside = staging.path().join("b.txt");
        std::fs::write(&outside, b"a").unwrap();
        std::fs::write(&inside, b"b").unwrap();
        let client = reqwest::Client::new();

        let copied = stage_file(&client, outside.to_str().unwrap(), Some(staging.path()))
            .await
            .unwrap();
        assert!(is_staged_copy(outside.to_str().unwrap(), &copied).await);

        let in_place = stage_file(&client, inside.to_str().unwrap(), Some(staging.path()))
            .await
            .unwrap();
        assert!(!is_staged_copy(inside.to_str().unwrap(), &in_place).await);
        assert!(is_staged_copy("https://example.com/b.txt", &in_place).await);
    }

    #[tokio::test]
    async fn test_staging_dir_leaves_no_write_check_file() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(staging_dir(Some(dir.path())).await, dir.path());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_staging_dir_rejects_plain_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(staging_dir(Some(file.path())).await, std::env::temp_dir());
    }

    #[tokio::test]
    async fn test_stage_http_truncated_body_removes_partial_file() {
        let base = serve_declared("200 OK", vec![7u8; 1_000], 200_000).await;
        let staging = tempfile::tempdir().unwrap();

        let result = stage_file(
            &reqwest::Client::new(),
            &format!("{}/partial.bin", base),
            Some(staging.path()),
        )
        .await;

        assert!(matches!(result, Err(RemoteFetchError::Io { .. })));
        let target = std::fs::canonicalize(staging.path()).unwrap().join("partial.bin");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_stage_missing_local_file() {
        let staging = tempfile::tempdir().unwrap();
        let result = stage_file(
            &reqwest::Client::new(),
            "/definitely/not/here.txt",
            Some(staging.path()),
        )
        .await;

        assert!(matches!(result, Err(RemoteFetchError::Io { .. })));
    }

    #[tokio::test]
    async fn test_stage_http_file() {
        let body: Vec<u8> = (0..150_000u32).map(|i| (i % 256) as u8).collect();
        let base = serve_once("200 OK", body.clone()).await;
        let staging = tempfile::tempdir().unwrap();

        let staged = stage_file(
            &reqwest::Client::new(),
            &format!("{}/downloads/archive.bin?token=abc", base),
            Some(staging.path()),
        )
        .await
        .unwrap();

        assert_eq!(staged.file_name().unwrap(), "archive.bin");
        assert_eq!(std::fs::read(&staged).unwrap(), body);
    }

    #[tokio::test]
    async fn test_stage_http_error_status() {
        let base = serve_once("404 Not Found", b"gone".to_vec()).await;
        let staging = tempfile::tempdir().unwrap();

        let result = stage_file(
            &reqwest::Client::new(),
            &format!("{}/missing.png", base),
            Some(staging.path()),
        )
        .await;

        assert!(matches!(result, Err(RemoteFetchError::Http { .. })));
    }
}
