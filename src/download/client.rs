//! HTTP client that streams one artifact to disk, resuming partial files.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

use super::DownloadError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::api::default_user_agent;

/// What one successful transfer did on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Bytes written by this transfer.
    pub bytes_written: u64,
    /// Size of the file once the transfer finished.
    pub final_size: u64,
    /// Offset the transfer continued from; zero for a fresh download.
    pub resumed_from: u64,
}

/// Reported to the caller while a transfer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// The destination is open and writing starts at `offset`.
    Started { offset: u64 },
    /// This many more bytes were handed to the file writer.
    Chunk(u64),
}

/// Streaming HTTP downloader.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client with explicit timeouts.
    ///
    /// `read_timeout` bounds the gap between chunks, not the whole transfer.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be
    /// initialized.
    pub fn new(
        user_agent: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(DownloadError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Client with the default user agent and timeouts (30s connect, 5min read).
    ///
    /// # Errors
    ///
    /// See [`HttpClient::new`].
    pub fn with_defaults() -> Result<Self, DownloadError> {
        Self::new(
            &default_user_agent(),
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Streams `url` into `dest` with no deadline.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::fetch_to_path_until`].
    pub async fn fetch_to_path<F>(
        &self,
        url: &str,
        dest: &Path,
        on_event: F,
    ) -> Result<TransferOutcome, DownloadError>
    where
        F: FnMut(TransferEvent) + Send,
    {
        self.fetch_to_path_until(url, dest, None, on_event).await
    }

    /// Streams `url` into `dest`, reporting progress through `on_event`.
    ///
    /// If `dest` already holds a partial file, only the missing suffix is
    /// requested with `Range: bytes=<len>-`. A `206` reply is appended; a
    /// `200` (range ignored) or `416` restarts from zero.
    ///
    /// Passing `deadline` bounds the whole attempt. When it expires mid-body
    /// the bytes received so far are flushed before the timeout is returned,
    /// so the next attempt resumes after them.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] describing the failed request, write,
    /// size check or expired deadline.
    #[instrument(skip(self, deadline, on_event), fields(dest = %dest.display()))]
    pub async fn fetch_to_path_until<F>(
        &self,
        url: &str,
        dest: &Path,
        deadline: Option<Instant>,
        mut on_event: F,
    ) -> Result<TransferOutcome, DownloadError>
    where
        F: FnMut(TransferEvent) + Send,
    {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::io(parent, e))?;
            }
        }

        let existing_bytes = tokio::fs::metadata(dest)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        let mut response = within(deadline, url, self.send(url, existing_bytes)).await?;
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(existing_bytes, "range not satisfiable, restarting from zero");
            response = within(deadline, url, self.send(url, 0)).await?;
        }

        let resumed = existing_bytes > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        let offset = if resumed { existing_bytes } else { 0 };

        if resumed {
            if let Some(start) = content_range_start(&response) {
                if start != existing_bytes {
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(DownloadError::integrity(dest, existing_bytes, start));
                }
            }
        }

        let expected_size = response.content_length().map(|len| offset + len);

        let file = if resumed {
            OpenOptions::new()
                .append(true)
                .open(dest)
                .await
                .map_err(|e| DownloadError::io(dest, e))?
        } else {
            if existing_bytes > 0 {
                debug!(existing_bytes, status = %response.status(), "server ignored range, truncating");
            }
            File::create(dest)
                .await
                .map_err(|e| DownloadError::io(dest, e))?
        };

        on_event(TransferEvent::Started { offset });
        let bytes_written =
            stream_to_file(file, response, url, dest, deadline, &mut on_event).await?;
        let final_size = offset + bytes_written;

        if let Some(expected) = expected_size {
            if expected != final_size {
                return Err(DownloadError::integrity(dest, expected, final_size));
            }
        }

        if final_size == 0 {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(DownloadError::empty_body(url));
        }

        info!(bytes = final_size, resumed_from = offset, "download complete");

        Ok(TransferOutcome {
            bytes_written,
            final_size,
            resumed_from: offset,
        })
    }

    /// Sends a GET, with a range header when `offset > 0`.
    ///
    /// A `416` is only passed through when a range was requested.
    async fn send(&self, url: &str, offset: u64) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if status.is_success() || (offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE) {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Err(DownloadError::http_status_with_retry_after(
            url,
            status.as_u16(),
            retry_after,
        ))
    }
}

/// Runs `request`, turning an expired `deadline` into a timeout error.
async fn within<T>(
    deadline: Option<Instant>,
    url: &str,
    request: impl Future<Output = Result<T, DownloadError>>,
) -> Result<T, DownloadError> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, request)
            .await
            .unwrap_or_else(|_| Err(DownloadError::timeout(url))),
        None => request.await,
    }
}

/// Streams the response body into `file`, returning bytes written.
///
/// Buffered data is flushed even when the stream fails or the deadline
/// passes midway, so the partial file reflects everything received.
async fn stream_to_file<F>(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    deadline: Option<Instant>,
    on_event: &mut F,
) -> Result<u64, DownloadError>
where
    F: FnMut(TransferEvent) + Send,
{
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    let mut failure = None;

    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!(bytes_written, "deadline passed mid-body");
                    failure = Some(DownloadError::timeout(url));
                    break;
                }
            },
            None => stream.next().await,
        };
        let Some(chunk_result) = next else {
            break;
        };
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                failure = Some(DownloadError::network(url, e));
                break;
            }
        };
        if let Err(e) = writer.write_all(&chunk).await {
            failure = Some(DownloadError::io(file_path, e));
            break;
        }
        let len = chunk.len() as u64;
        bytes_written += len;
        on_event(TransferEvent::Chunk(len));
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    match failure {
        Some(error) => Err(error),
        None => Ok(bytes_written),
    }
}

/// First byte position from `Content-Range: bytes <start>-<end>/<total>`.
fn content_range_start(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}
