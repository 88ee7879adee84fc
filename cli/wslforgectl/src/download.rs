//! HTTP downloads for rootfs images and relay artifacts.
//!
//! Downloads stream to a `.part` sibling of the destination and are renamed
//! into place only after the transfer (and any requested checksum) succeeds.

use std::io::Write;
use std::path::Path;

use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from download operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download of {url} failed with status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },
}

/// HTTP downloader.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Download `url` to `dest`, verifying `expected_sha256` when given.
    ///
    /// A checksum mismatch removes the partial file and fails the operation.
    /// Returns the number of bytes written.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<u64, DownloadError> {
        debug!(url = %url, dest = %dest.display(), "Starting download");

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Any failure from here on must not leave a stale partial file.
        let temp_path = dest.with_extension("part");
        let (total, actual) = match stream_to_file(&mut response, &temp_path).await {
            Ok(streamed) => streamed,
            Err(err) => {
                std::fs::remove_file(&temp_path).ok();
                return Err(err);
            }
        };

        if let Some(expected) = expected_sha256 {
            if !expected.eq_ignore_ascii_case(&actual) {
                std::fs::remove_file(&temp_path).ok();
                return Err(DownloadError::ChecksumMismatch {
                    url: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        if let Err(err) = std::fs::rename(&temp_path, dest) {
            std::fs::remove_file(&temp_path).ok();
            return Err(err.into());
        }

        info!(url = %url, size = total, "Download complete");
        Ok(total)
    }
}

/// Stream the response body to `path`, hashing as it goes. Returns the byte
/// count and the hex SHA-256 of what was written.
async fn stream_to_file(
    response: &mut reqwest::Response,
    path: &std::path::Path,
) -> Result<(u64, String), DownloadError> {
    let mut file = std::fs::File::create(path)?;
    let mut hasher = Sha256::new();
    let mut total: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        file.write_all(&chunk)?;
        total += chunk.len() as u64;
    }

    file.sync_all()?;
    Ok((total, hex::encode(hasher.finalize())))
}

/// Derive a destination file name from a URL, falling back to `fallback`.
pub fn file_name_from_url(url: &str, fallback: &str) -> String {
    url.split('?')
        .next()
        .and_then(|base| base.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_from_plain_url() {
        assert_eq!(
            file_name_from_url("https://example.com/images/rootfs.tar.gz", "rootfs"),
            "rootfs.tar.gz"
        );
    }

    #[test]
    fn file_name_ignores_query_string() {
        assert_eq!(
            file_name_from_url("https://example.com/a/b.tar.xz?token=abc", "rootfs"),
            "b.tar.xz"
        );
    }

    #[test]
    fn file_name_falls_back_on_bare_host() {
        assert_eq!(
            file_name_from_url("https://example.com/", "rootfs"),
            "rootfs"
        );
    }

    #[tokio::test]
    async fn truncated_transfer_leaves_no_partial_file() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Advertise more body than gets sent, then drop the connection.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\ntruncated")
                .await
                .unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.bin");

        let result = Downloader::new()
            .unwrap()
            .fetch(&format!("http://{addr}/artifact.bin"), &dest, None)
            .await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
