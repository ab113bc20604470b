use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use reqwest::{Client, Response};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{DownloadError, DownloadFailure};

/// Jitter needs a non-empty interval to draw from.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// How many times a PDF download is attempted and the bounds of the wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetrySettings {
    /// Exponential backoff allowing `attempts - 1` retries after the first try.
    pub fn backoff(&self) -> ExponentialBackoff {
        let min = self.min_delay.max(MIN_RETRY_DELAY);
        ExponentialBackoff::builder()
            .retry_bounds(min, self.max_delay.max(min))
            .build_with_max_retries(self.attempts.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downloaded {
    pub attempts: u32,
    pub bytes: u64,
}

/// Sibling path the body is streamed into before it replaces `dest`.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

pub struct Downloader {
    client: Client,
    retry: RetrySettings,
    backoff: ExponentialBackoff,
}

impl Downloader {
    pub fn new(retry: RetrySettings) -> Self {
        Self {
            client: Client::new(),
            retry,
            backoff: retry.backoff(),
        }
    }

    /// Streams `pdf_url` into `dest`, overwriting any existing file.
    ///
    /// Transport failures and non-2xx responses are retried while the backoff
    /// policy allows it. Disk errors fail immediately. A failed attempt never
    /// leaves a partial file behind.
    pub async fn download_pdf(&self, pdf_url: &str, dest: &Path) -> Result<Downloaded, DownloadFailure> {
        let started = SystemTime::now();
        let mut past_retries = 0;
        loop {
            let attempt = past_retries + 1;
            let error = match self.try_download(pdf_url, dest).await {
                Ok(bytes) => return Ok(Downloaded { attempts: attempt, bytes }),
                Err(error) if error.is_retryable() => error,
                Err(error) => return Err(DownloadFailure { attempts: attempt, error }),
            };

            match self.backoff.should_retry(started, past_retries) {
                RetryDecision::Retry { execute_after } => {
                    let delay = execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or_default();
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                        attempt,
                        self.retry.attempts,
                        pdf_url,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    past_retries += 1;
                }
                RetryDecision::DoNotRetry => return Err(DownloadFailure { attempts: attempt, error }),
            }
        }
    }

    async fn try_download(&self, pdf_url: &str, dest: &Path) -> Result<u64, DownloadError> {
        tracing::debug!("Downloading PDF from: {}", pdf_url);
        let response = self.client.get(pdf_url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                status: response.status(),
                url: pdf_url.to_string(),
            });
        }

        let part = part_path(dest);
        match Self::save(response, &part, dest).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Could not remove {}: {}", part.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    /// Writes the body to `part`, then renames it over `dest`.
    async fn save(mut response: Response, part: &Path, dest: &Path) -> Result<u64, DownloadError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| DownloadError::Io { path, source }
        };

        let mut file = File::create(part).await.map_err(io_err(part))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(io_err(part))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err(part))?;
        drop(file);

        tokio::fs::rename(part, dest).await.map_err(io_err(dest))?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PDF_BYTES: &[u8] = b"%PDF-1.4 test document";

    fn fast_policy(attempts: u32) -> RetrySettings {
        RetrySettings {
            attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Serves a 200 that promises 1000 bytes but closes after a few.
    async fn truncating_server(hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n%PDF-1.4 abc")
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/short.pdf")
    }

    #[test]
    fn test_backoff_allows_attempts_minus_one_retries() {
        let settings = RetrySettings {
            attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        let backoff = settings.backoff();
        let start = SystemTime::now();

        for past in 0..2 {
            match backoff.should_retry(start, past) {
                RetryDecision::Retry { execute_after } => {
                    let wait = execute_after.duration_since(start).unwrap_or_default();
                    assert!(wait <= Duration::from_millis(350) + Duration::from_secs(1));
                }
                RetryDecision::DoNotRetry => panic!("retry {past} should be allowed"),
            }
        }
        assert!(matches!(backoff.should_retry(start, 2), RetryDecision::DoNotRetry));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let backoff = fast_policy(1).backoff();
        assert!(matches!(
            backoff.should_retry(SystemTime::now(), 0),
            RetryDecision::DoNotRetry
        ));
    }

    #[test]
    fn test_part_path_sits_next_to_dest() {
        assert_eq!(
            part_path(Path::new("out/P19-1001.pdf")),
            PathBuf::from("out/P19-1001.pdf.part")
        );
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let url = truncating_server(hits.clone()).await;

        let dest = dir.path().join("short.pdf");
        let failure = Downloader::new(fast_policy(3))
            .download_pdf(&url, &dest)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert!(matches!(failure.error, DownloadError::Transport(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_truncated_body_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = truncating_server(Arc::new(AtomicUsize::new(0))).await;

        let dest = dir.path().join("short.pdf");
        std::fs::write(&dest, PDF_BYTES).unwrap();
        Downloader::new(fast_policy(1))
            .download_pdf(&url, &dest)
            .await
            .unwrap_err();

        assert_eq!(std::fs::read(&dest).unwrap(), PDF_BYTES);
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/P19-1001.pdf"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/P19-1001.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .mount(&server)
            .await;

        let dest = dir.path().join("P19-1001.pdf");
        let url = format!("{}/P19-1001.pdf", server.uri());
        let downloaded = Downloader::new(fast_policy(3))
            .download_pdf(&url, &dest)
            .await
            .unwrap();

        assert_eq!(downloaded.attempts, 3);
        assert_eq!(downloaded.bytes, PDF_BYTES.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), PDF_BYTES);
        assert!(!part_path(&dest).exists());
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(4)
            .mount(&server)
            .await;

        let url = format!("{}/missing.pdf", server.uri());
        let failure = Downloader::new(fast_policy(4))
            .download_pdf(&url, &dir.path().join("missing.pdf"))
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 4);
        assert!(matches!(failure.error, DownloadError::Status { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_retry_after_success() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .expect(1)
            .mount(&server)
            .await;

        let dest = dir.path().join("a.pdf");
        std::fs::write(&dest, b"stale").unwrap();
        let downloaded = Downloader::new(fast_policy(3))
            .download_pdf(&format!("{}/a.pdf", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(downloaded.attempts, 1);
        assert_eq!(std::fs::read(&dest).unwrap(), PDF_BYTES);
    }

    #[tokio::test]
    async fn test_disk_error_is_not_retried() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .expect(1)
            .mount(&server)
            .await;

        let dest = dir.path().join("no-such-dir").join("a.pdf");
        let failure = Downloader::new(fast_policy(3))
            .download_pdf(&format!("{}/a.pdf", server.uri()), &dest)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert!(matches!(failure.error, DownloadError::Io { .. }));
    }

    #[tokio::test]
    async fn test_connection_error_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let failure = Downloader::new(fast_policy(2))
            .download_pdf("http://127.0.0.1:1/a.pdf", &dir.path().join("a.pdf"))
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 2);
        assert!(matches!(failure.error, DownloadError::Transport(_)));
    }
}
