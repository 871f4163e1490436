//! Download handle.
//!
//! Created when a `browsingContext.downloadWillBegin` event arrives.
//! The matching `downloadEnd` event sets the terminal state exactly
//! once; callers awaiting [`Download::path`] or [`Download::save_as`]
//! suspend until then and may read the result any number of times.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::Client;

// ============================================================================
// DownloadEnd
// ============================================================================

/// Terminal state reported by the `downloadEnd` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEnd {
    /// Terminal status: `complete`, `canceled`, or a failure string.
    pub status: String,
    /// Remote-side temp file path, present when status is `complete`.
    pub filepath: Option<String>,
}

impl DownloadEnd {
    /// Returns `true` if the download finished successfully.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

// ============================================================================
// Download
// ============================================================================

struct DownloadInner {
    client: Client,
    url: String,
    suggested_filename: String,
    /// None until the downloadEnd event fires; set at most once.
    state: watch::Sender<Option<DownloadEnd>>,
}

/// A file download triggered by the page.
#[derive(Clone)]
pub struct Download {
    inner: Arc<DownloadInner>,
}

impl Download {
    /// Creates a download handle from a `downloadWillBegin` payload.
    pub(crate) fn new(client: Client, url: String, suggested_filename: String) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(DownloadInner {
                client,
                url,
                suggested_filename,
                state,
            }),
        }
    }

    /// The URL the download was fetched from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The filename suggested by the server or page.
    #[must_use]
    pub fn suggested_filename(&self) -> &str {
        &self.inner.suggested_filename
    }

    /// Waits for the download to finish and returns its terminal state.
    pub async fn wait(&self) -> DownloadEnd {
        let mut rx = self.inner.state.subscribe();
        let end = rx
            .wait_for(Option::is_some)
            .await
            .expect("download state sender lives as long as the handle");
        end.clone().expect("checked by wait_for")
    }

    /// Waits for completion and returns the remote temp file path.
    ///
    /// Returns `None` when the download ended without a file (canceled
    /// or failed).
    pub async fn path(&self) -> Option<String> {
        self.wait().await.filepath
    }

    /// Waits for completion, then asks the remote end to copy the file
    /// to `dest_path`.
    ///
    /// # Errors
    ///
    /// - [`Error::DownloadFailed`] if the terminal status is not
    ///   `complete` or no file path was reported
    /// - any error from the `vibium:download.saveAs` command
    pub async fn save_as(&self, dest_path: &str) -> Result<()> {
        let end = self.wait().await;

        let is_complete = end.is_complete();
        let Some(filepath) = end.filepath.filter(|_| is_complete) else {
            return Err(Error::download_failed(end.status));
        };

        self.inner
            .client
            .send(
                "vibium:download.saveAs",
                json!({
                    "sourcePath": filepath,
                    "destPath": dest_path,
                }),
            )
            .await?;
        Ok(())
    }

    /// Marks the download finished. Called by the page's `downloadEnd`
    /// subscription; only the first call takes effect.
    pub(crate) fn complete(&self, status: String, filepath: Option<String>) {
        let updated = self.inner.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(DownloadEnd { status, filepath });
            true
        });

        if updated {
            debug!(url = %self.inner.url, "Download completed");
        }
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("url", &self.inner.url)
            .field("suggested_filename", &self.inner.suggested_filename)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Client connected to a silent in-process WebSocket server.
    async fn loopback_client() -> Client {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
                // Hold the stream open; never answer.
                let _ws = ws;
                std::future::pending::<()>().await;
            }
        });

        Client::connect(&format!("ws://{addr}")).await.expect("connect")
    }

    #[test]
    fn test_download_end_is_complete() {
        let end = DownloadEnd {
            status: "complete".to_string(),
            filepath: Some("/tmp/file".to_string()),
        };
        assert!(end.is_complete());

        let canceled = DownloadEnd {
            status: "canceled".to_string(),
            filepath: None,
        };
        assert!(!canceled.is_complete());
    }

    #[tokio::test]
    async fn test_wait_resumes_on_completion() {
        let client = loopback_client().await;
        let download = Download::new(client, "https://example.com/a.zip".into(), "a.zip".into());

        let waiter = {
            let download = download.clone();
            tokio::spawn(async move { download.wait().await })
        };

        download.complete("complete".to_string(), Some("/tmp/a.zip".to_string()));

        let end = waiter.await.expect("join");
        assert!(end.is_complete());
        assert_eq!(end.filepath.as_deref(), Some("/tmp/a.zip"));

        // Readable again after resolution.
        assert_eq!(download.path().await.as_deref(), Some("/tmp/a.zip"));
    }

    #[tokio::test]
    async fn test_completion_is_set_at_most_once() {
        let client = loopback_client().await;
        let download = Download::new(client, "https://example.com/b.bin".into(), "b.bin".into());

        download.complete("canceled".to_string(), None);
        download.complete("complete".to_string(), Some("/tmp/b.bin".to_string()));

        let end = download.wait().await;
        assert_eq!(end.status, "canceled");
        assert_eq!(end.filepath, None);
    }

    #[tokio::test]
    async fn test_save_as_rejects_failed_download() {
        let client = loopback_client().await;
        let download = Download::new(client, "https://example.com/c.txt".into(), "c.txt".into());

        download.complete("canceled".to_string(), None);

        let err = download.save_as("/tmp/out.txt").await.expect_err("failed");
        assert!(matches!(err, Error::DownloadFailed { .. }));
    }
}
