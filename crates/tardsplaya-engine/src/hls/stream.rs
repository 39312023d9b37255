//! Stream lifecycle.
//!
//! Owns one channel's cancel token, worker tasks, and player process for the
//! duration of a single playback session: `Starting -> Running -> Draining
//! -> Terminated`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use super::buffer::{self, ChunkCount};
use super::downloader::{DownloaderExit, SegmentDownloader};
use super::player::PlayerHandle;
use super::scheduler::{DownloadJob, SchedulerExit, SegmentScheduler};
use crate::config::EngineConfig;
use crate::error::StreamErrorKind;
use crate::fetcher::Fetcher;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Terminated,
}

/// How a Stream's worker set finished, folded into one completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    NormalEnd,
    UserCancel,
    Error(StreamErrorKind),
}

/// A running playback session for one channel.
pub struct Stream {
    token: CancellationToken,
    depth: Arc<ChunkCount>,
    /// Set only by `cancel()`, so a consumer-disconnect-triggered teardown
    /// (which also cancels `token`, to unwind C4/C5) isn't mistaken for a
    /// user-requested stop in the completion signal.
    user_cancelled: Arc<AtomicBool>,
    /// Set by the player task when a write fails for a reason other than
    /// cancellation: `Disconnect` is terminal and distinct from `UserCancel`.
    disconnected: Arc<AtomicBool>,
    scheduler_handle: JoinHandle<SchedulerExit>,
    downloader_handle: JoinHandle<DownloaderExit>,
    player_handle: JoinHandle<()>,
    phase: Phase,
}

impl Stream {
    /// Wires the scheduler, downloader, buffer, and player together for one
    /// media playlist URL and spawns each as its own task.
    pub fn start(
        media_url: Url,
        fetcher: Arc<Fetcher>,
        config: EngineConfig,
        player_command: String,
        player_args: Vec<String>,
    ) -> Result<Self, StreamErrorKind> {
        let token = CancellationToken::new();
        let (jobs_tx, jobs_rx) = mpsc::channel::<DownloadJob>(config.buffer.max_depth());
        let (producer, mut consumer, depth) =
            buffer::channel(config.buffer.target_depth, config.buffer.max_depth());

        let mut scheduler = SegmentScheduler::new(
            Arc::clone(&fetcher),
            media_url,
            config.playlist.clone(),
            config.buffer.clone(),
            config.seen_set.clone(),
            jobs_tx,
            Arc::clone(&depth),
            token.clone(),
        );
        let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

        let mut downloader = SegmentDownloader::new(
            Arc::clone(&fetcher),
            config.downloader.clone(),
            jobs_rx,
            producer,
            token.clone(),
        );
        let downloader_handle = tokio::spawn(async move { downloader.run().await });

        let mut player = PlayerHandle::spawn(&player_command, &player_args)
            .map_err(|_| StreamErrorKind::PlayerLaunch)?
            .with_config(config.player);
        let player_token = token.clone();
        let backpressure_retry_delay = config.playlist.backpressure_retry_delay;
        let user_cancelled = Arc::new(AtomicBool::new(false));
        let disconnected = Arc::new(AtomicBool::new(false));
        let disconnected_writer = Arc::clone(&disconnected);
        let player_handle = tokio::spawn(async move {
            // Startup gate: hold off writing until depth has reached
            // target_depth at least once, then never re-assert it.
            while !consumer.initial_fill_satisfied() {
                tokio::select! {
                    biased;
                    _ = player_token.cancelled() => break,
                    _ = tokio::time::sleep(backpressure_retry_delay) => {}
                }
                if player_token.is_cancelled() {
                    break;
                }
            }
            if !player_token.is_cancelled() {
                info!(target: "tardsplaya::buf", "initial fill reached, starting playback");
            }

            loop {
                tokio::select! {
                    biased;
                    _ = player_token.cancelled() => break,
                    chunk = consumer.pop() => {
                        match chunk {
                            Some(payload) => {
                                if let Err(err) = player.write(&payload.bytes, &player_token).await {
                                    if !matches!(err, crate::error::IpcError::Cancelled) {
                                        disconnected_writer.store(true, Ordering::Release);
                                    }
                                    player_token.cancel();
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            player.close().await;
        });

        Ok(Self {
            token,
            depth,
            user_cancelled,
            disconnected,
            scheduler_handle,
            downloader_handle,
            player_handle,
            phase: Phase::Starting,
        })
    }

    /// User-requested stop: idempotent, distinguishes this path from an
    /// internal teardown triggered by a consumer disconnect.
    pub fn cancel(&self) {
        self.user_cancelled.store(true, Ordering::Release);
        self.token.cancel();
    }

    pub fn chunk_count(&self) -> usize {
        self.depth.get()
    }

    /// A cloneable cancel handle the Coordinator can keep after the full
    /// `Stream` has been moved into its supervising task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn depth_handle(&self) -> Arc<ChunkCount> {
        Arc::clone(&self.depth)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Awaits all three worker tasks and folds their exits into one
    /// terminal completion signal.
    pub async fn join(mut self) -> Completion {
        self.phase = Phase::Running;
        let scheduler_exit = self.scheduler_handle.await.unwrap_or(SchedulerExit::Cancelled);
        self.phase = Phase::Draining;
        let downloader_exit = self
            .downloader_handle
            .await
            .unwrap_or(DownloaderExit::Cancelled);
        let _ = self.player_handle.await;
        self.phase = Phase::Terminated;

        info!(
            target: "tardsplaya::lifecycle",
            ?scheduler_exit,
            ?downloader_exit,
            "stream terminated"
        );

        // Precedence: a consumer disconnect and a fetch-error cap are both
        // terminal errors even if they also tripped the shared cancel token
        // to unwind the scheduler and downloader; only an explicit `cancel()`
        // call with neither of those present is a `UserCancel`.
        if self.disconnected.load(Ordering::Acquire) {
            return Completion::Error(StreamErrorKind::Disconnect);
        }
        if matches!(scheduler_exit, SchedulerExit::RepeatedFetch) {
            return Completion::Error(StreamErrorKind::RepeatedFetch);
        }
        if self.user_cancelled.load(Ordering::Acquire) {
            return Completion::UserCancel;
        }

        match scheduler_exit {
            SchedulerExit::NormalEnd => Completion::NormalEnd,
            SchedulerExit::RepeatedFetch => Completion::Error(StreamErrorKind::RepeatedFetch),
            SchedulerExit::Cancelled => Completion::UserCancel,
        }
    }
}
