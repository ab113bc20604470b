use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs::create_dir_all;

use crate::config::{Config, FileNaming};
use crate::layers::download::{Downloader, RetrySettings};
use crate::layers::resolution::{pdf_file_name, PdfResolver};
use crate::layers::{FetchResult, PaperRecord};

/// Why a paper did not end up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoUrl,
    RetriesExhausted { attempts: u32, error: String },
    Filesystem { error: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUrl => f.write_str("no PDF URL"),
            Self::RetriesExhausted { attempts, error } => {
                write!(f, "gave up after {attempts} attempts: {error}")
            }
            Self::Filesystem { error } => write!(f, "write failed: {error}"),
        }
    }
}

/// Terminal state of one paper in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Downloaded { path: PathBuf, attempts: u32 },
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPaper {
    pub id: String,
    pub title: String,
    pub reason: FailureReason,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub downloaded: Vec<PathBuf>,
    pub failures: Vec<FailedPaper>,
}

impl BatchReport {
    fn record(&mut self, paper: &PaperRecord, outcome: Outcome) {
        match outcome {
            Outcome::Downloaded { path, attempts } => {
                if attempts > 1 {
                    tracing::debug!("{} needed {} attempts", paper.id, attempts);
                }
                self.downloaded.push(path);
            }
            Outcome::Failed(reason) => self.failures.push(FailedPaper {
                id: paper.id.clone(),
                title: paper.display_title().to_string(),
                reason,
            }),
        }
    }

    pub fn success_count(&self) -> usize {
        self.downloaded.len()
    }

    pub fn log_summary(&self) {
        tracing::info!("Fetched {} PDFs.", self.success_count());
        if !self.failures.is_empty() {
            tracing::warn!("Unable to fetch {} PDFs.", self.failures.len());
        }
        for failed in &self.failures {
            tracing::debug!("{}: {} ({})", failed.id, failed.title, failed.reason);
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "Fetched {} PDFs.", self.success_count())?;
        write!(f, "Unable to fetch {} PDFs", self.failures.len())?;
        if self.failures.is_empty() {
            return writeln!(f, ".");
        }
        writeln!(f, ":")?;
        for failed in &self.failures {
            writeln!(f, "{}: {}", failed.id, failed.title)?;
        }
        Ok(())
    }
}

/// Downloads every paper of a fetch result into one directory, one at a time.
pub struct BatchDownloader {
    downloader: Downloader,
    resolver: PdfResolver,
    naming: FileNaming,
    output_dir: PathBuf,
}

impl BatchDownloader {
    pub fn new(retry: RetrySettings, resolver: PdfResolver, naming: FileNaming, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader: Downloader::new(retry),
            resolver,
            naming,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retry,
            PdfResolver::new(config.constructed_pdf_base()),
            config.file_naming,
            &config.output_dir,
        )
    }

    /// Creates the output directory and processes each paper in order.
    /// Per-paper failures are recorded; only directory creation aborts the run.
    pub async fn run(&self, papers: &FetchResult) -> Result<BatchReport> {
        create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("creating output directory {}", self.output_dir.display()))?;

        let mut report = BatchReport::default();
        for paper in papers {
            let outcome = self.process(paper).await;
            report.record(paper, outcome);
        }
        Ok(report)
    }

    async fn process(&self, paper: &PaperRecord) -> Outcome {
        let Some(pdf_url) = self.resolver.resolve(paper) else {
            tracing::error!("No PDF available for {}: {}", paper.id, paper.display_title());
            return Outcome::Failed(FailureReason::NoUrl);
        };

        let path = self.output_dir.join(pdf_file_name(paper, self.naming));
        match self.downloader.download_pdf(&pdf_url, &path).await {
            Ok(done) => {
                tracing::info!(
                    "Downloaded PDF for {}: {} ({} bytes)",
                    paper.id,
                    paper.display_title(),
                    done.bytes
                );
                Outcome::Downloaded {
                    path,
                    attempts: done.attempts,
                }
            }
            Err(failure) if failure.error.is_retryable() => {
                tracing::error!(
                    "Failed to download PDF for {}: {} after {} attempts. Error: {}",
                    paper.id,
                    paper.display_title(),
                    failure.attempts,
                    failure.error
                );
                Outcome::Failed(FailureReason::RetriesExhausted {
                    attempts: failure.attempts,
                    error: failure.error.to_string(),
                })
            }
            Err(failure) => {
                tracing::error!("Could not save PDF for {}: {}", paper.id, failure.error);
                Outcome::Failed(FailureReason::Filesystem {
                    error: failure.error.to_string(),
                })
            }
        }
    }
}
