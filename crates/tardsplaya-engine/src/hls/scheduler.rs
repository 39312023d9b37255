//! Segment scheduler.
//!
//! Polls the live media playlist, applies the ad-filter, and hands keepable
//! segment URLs to the downloader in strict playlist order, respecting the
//! buffer's backpressure and a bounded seen-URL set.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::buffer::ChunkCount;
use super::playlist::{parse_media, SegmentEntry};
use super::ad_filter;
use crate::config::{BufferConfig, PlaylistConfig, SeenSetConfig};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

/// One admitted download task, handed to C5 in strict playlist order.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: Url,
    pub media_sequence_number: u64,
}

/// Why the scheduler loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    Cancelled,
    RepeatedFetch,
    NormalEnd,
}

/// Bounded, insertion-order-evicting set of seen segment URLs. Capacity is a
/// config knob rather than auto-derived from the live window length.
struct SeenSet {
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, url: &str) -> bool {
        self.order.iter().any(|u| u == url)
    }

    fn insert(&mut self, url: String) {
        self.order.push_back(url);
        while self.order.len() > self.capacity {
            self.order.pop_front();
        }
    }
}

pub struct SegmentScheduler {
    fetcher: Arc<Fetcher>,
    media_url: Url,
    playlist_config: PlaylistConfig,
    buffer_config: BufferConfig,
    seen: SeenSet,
    jobs_tx: mpsc::Sender<DownloadJob>,
    depth: Arc<ChunkCount>,
    token: CancellationToken,
}

impl SegmentScheduler {
    pub fn new(
        fetcher: Arc<Fetcher>,
        media_url: Url,
        playlist_config: PlaylistConfig,
        buffer_config: BufferConfig,
        seen_set_config: SeenSetConfig,
        jobs_tx: mpsc::Sender<DownloadJob>,
        depth: Arc<ChunkCount>,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            media_url,
            playlist_config,
            buffer_config,
            seen: SeenSet::new(seen_set_config.capacity),
            jobs_tx,
            depth,
            token,
        }
    }

    /// Runs the scheduler loop until one of the exit conditions fires.
    pub async fn run(&mut self) -> SchedulerExit {
        let mut consecutive_errors = 0u32;

        loop {
            if self.token.is_cancelled() {
                return SchedulerExit::Cancelled;
            }

            let body = match self.fetcher.get_text(&self.media_url, &self.token).await {
                Ok(body) => body,
                Err(FetchError::Cancelled) => return SchedulerExit::Cancelled,
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(
                        target: "tardsplaya::sched",
                        url = %self.media_url,
                        error = %err,
                        consecutive_errors,
                        "media playlist fetch failed"
                    );
                    if consecutive_errors >= self.playlist_config.max_consecutive_errors {
                        return SchedulerExit::RepeatedFetch;
                    }
                    if self.sleep_or_cancel(self.playlist_config.error_retry_delay).await {
                        return SchedulerExit::Cancelled;
                    }
                    continue;
                }
            };
            consecutive_errors = 0;

            let playlist = match parse_media(&body, &self.media_url) {
                Ok(playlist) => playlist,
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(target: "tardsplaya::sched", error = %err, "media playlist parse rejected");
                    if consecutive_errors >= self.playlist_config.max_consecutive_errors {
                        return SchedulerExit::RepeatedFetch;
                    }
                    if self.sleep_or_cancel(self.playlist_config.error_retry_delay).await {
                        return SchedulerExit::Cancelled;
                    }
                    continue;
                }
            };

            let decisions = ad_filter::filter(&playlist);
            for (entry, keep) in decisions {
                if !keep {
                    continue;
                }
                if self.token.is_cancelled() {
                    return SchedulerExit::Cancelled;
                }
                if let Some(exit) = self.admit(&entry).await {
                    return exit;
                }
            }

            if playlist.end_list {
                info!(target: "tardsplaya::sched", "end-list observed, normal end");
                return SchedulerExit::NormalEnd;
            }

            if self.sleep_or_cancel(self.playlist_config.poll_interval).await {
                return SchedulerExit::Cancelled;
            }
        }
    }

    /// Admits one keepable segment: skip if already seen, otherwise wait out
    /// backpressure, then commit it to the seen set and hand it to C5.
    async fn admit(&mut self, entry: &SegmentEntry) -> Option<SchedulerExit> {
        let url_str = entry.url.to_string();
        if self.seen.contains(&url_str) {
            return None;
        }

        loop {
            if self.token.is_cancelled() {
                return Some(SchedulerExit::Cancelled);
            }
            if self.depth.get() < self.buffer_config.max_depth() {
                break;
            }
            if self.sleep_or_cancel(self.playlist_config.backpressure_retry_delay).await {
                return Some(SchedulerExit::Cancelled);
            }
        }

        self.seen.insert(url_str);
        debug!(
            target: "tardsplaya::sched",
            url = %entry.url,
            msn = entry.media_sequence_number,
            "admitted segment"
        );
        if self
            .jobs_tx
            .send(DownloadJob {
                url: entry.url.clone(),
                media_sequence_number: entry.media_sequence_number,
            })
            .await
            .is_err()
        {
            // Downloader side has gone away (consumer disconnect unwinding).
            return Some(SchedulerExit::Cancelled);
        }
        None
    }

    /// Sleeps for `duration`, racing cancellation; returns `true` if cancelled.
    async fn sleep_or_cancel(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
