//! Chunked copy from local files into storage

use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use crate::storage::{Storage, StorageResult};

/// Bytes read per chunk when copying into storage
pub const READ_COUNT: usize = 100_000;

/// Copy `src` into `dst` one chunk at a time.
///
/// Every chunk except the last holds exactly `chunk_size` bytes, and each is
/// written out before the next read. Returns the number of bytes copied.
pub async fn copy_chunked<R, W>(src: &mut R, dst: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;

    loop {
        let filled = read_chunk(src, &mut buf).await?;
        if filled == 0 {
            break;
        }
        dst.write_all(&buf[..filled]).await?;
        total += filled as u64;

        if filled < chunk_size {
            break;
        }
    }

    Ok(total)
}

/// Fill `buf` unless the source ends first
async fn read_chunk<R>(src: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Stream a local file into storage under `key`.
///
/// The destination is shut down on every path, including after a failed
/// read or write; the first error wins.
#[instrument(skip(storage), fields(storage = storage.name()))]
pub async fn copy_file_to_storage(
    storage: &dyn Storage,
    local_path: &Path,
    key: &str,
) -> StorageResult<u64> {
    let mut src = fs::File::open(local_path).await?;
    let mut dst = storage.create_write_stream(key).await?;

    let copied = copy_chunked(&mut src, &mut dst, READ_COUNT).await;
    let closed = dst.shutdown().await;
    drop(src);

    match (copied, closed) {
        (Ok(bytes), Ok(())) => {
            debug!(bytes, "Copied file into storage");
            Ok(bytes)
        }
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "Failed to close storage stream after copy error");
            }
            Err(e.into())
        }
        (Ok(_), Err(e)) => Err(e.into()),
    }
}
