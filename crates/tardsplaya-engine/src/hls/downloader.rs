//! Segment downloader.
//!
//! Consumes admitted jobs from the scheduler on a single task so completion
//! order matches admission order, fetches each one with its own short retry
//! budget, and pushes the payload into the buffer.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::buffer::SegmentProducer;
use super::buffer::SegmentPayload;
use super::scheduler::DownloadJob;
use crate::config::DownloaderConfig;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Why the downloader loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloaderExit {
    Cancelled,
    JobsExhausted,
    BufferClosed,
}

pub struct SegmentDownloader {
    fetcher: Arc<Fetcher>,
    config: DownloaderConfig,
    jobs_rx: tokio::sync::mpsc::Receiver<DownloadJob>,
    producer: SegmentProducer,
    token: CancellationToken,
}

impl SegmentDownloader {
    pub fn new(
        fetcher: Arc<Fetcher>,
        config: DownloaderConfig,
        jobs_rx: tokio::sync::mpsc::Receiver<DownloadJob>,
        producer: SegmentProducer,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            config,
            jobs_rx,
            producer,
            token,
        }
    }

    /// Runs until the job channel closes (scheduler done), the buffer's
    /// consumer half drops, or cancellation fires.
    pub async fn run(&mut self) -> DownloaderExit {
        let policy = RetryPolicy {
            max_attempts: self.config.max_attempts,
            base_delay: self.config.retry_delay,
            max_delay: self.config.retry_delay.saturating_mul(4),
        };

        loop {
            let job = tokio::select! {
                biased;
                _ = self.token.cancelled() => return DownloaderExit::Cancelled,
                job = self.jobs_rx.recv() => match job {
                    Some(job) => job,
                    None => return DownloaderExit::JobsExhausted,
                },
            };

            let fetcher = Arc::clone(&self.fetcher);
            let token = self.token.clone();
            let result = retry_with_backoff(
                &policy,
                &token,
                || FetchError::Cancelled,
                |_attempt| {
                    let fetcher = Arc::clone(&fetcher);
                    let token = token.clone();
                    let url = job.url.clone();
                    async move { fetcher.get_bytes(&url, &token).await }
                },
            )
            .await;

            let bytes = match result {
                Ok(bytes) => bytes,
                Err(FetchError::Cancelled) => return DownloaderExit::Cancelled,
                Err(err) => {
                    warn!(
                        target: "tardsplaya::dl",
                        url = %job.url,
                        msn = job.media_sequence_number,
                        error = %err,
                        "segment download abandoned after retries"
                    );
                    continue;
                }
            };

            if self.producer.push(SegmentPayload { bytes }).await.is_err() {
                return DownloaderExit::BufferClosed;
            }
        }
    }
}
