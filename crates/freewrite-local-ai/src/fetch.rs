//! Archive transfer from a model's download URL.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::LocalAIError;

/// Progress callback: `(bytes_written, bytes_expected)`. The expected size is
/// `None` when the server does not announce a content length.
pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) + Send + 'a;

/// Transfers a model archive to a local file.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Write the resource at `url` to `dest` and return the number of bytes written.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<u64, LocalAIError>;
}

/// Fetcher that streams archives over HTTPS.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a new fetcher with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<u64, LocalAIError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LocalAIError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LocalAIError::DownloadFailed(format!(
                "HTTP {}: {}",
                response.status(),
                url
            )));
        }

        let total_size = response.content_length().filter(|len| *len > 0);

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        progress(0, total_size);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LocalAIError::DownloadFailed(e.to_string()))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded, total_size);
        }

        file.flush().await?;

        debug!("Wrote {} bytes to {:?}", downloaded, dest);
        Ok(downloaded)
    }
}
