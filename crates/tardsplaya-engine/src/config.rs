//! Layered configuration tree.
//!
//! Every timing constant and size limit used by the pipeline lives here as a
//! field with a sensible `Default`, so operators can override one knob
//! without touching the pipeline code.

use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP fetcher policy.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    /// Relax certificate validation for legacy endpoints. Defaults to
    /// `false`; flipping this on is logged at `warn` by the client builder.
    pub danger_accept_invalid_certs: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(600),
            attempt_timeout: Duration::from_secs(3),
            danger_accept_invalid_certs: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// Segment scheduler cadence and error budget.
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    pub poll_interval: Duration,
    pub error_retry_delay: Duration,
    pub max_consecutive_errors: u32,
    pub backpressure_retry_delay: Duration,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            error_retry_delay: Duration::from_secs(2),
            max_consecutive_errors: 15,
            backpressure_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Segment downloader retry policy.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(300),
        }
    }
}

/// Bounded segment buffer sizing.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub target_depth: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { target_depth: 10 }
    }
}

impl BufferConfig {
    pub fn max_depth(&self) -> usize {
        self.target_depth * 2
    }
}

/// Player IPC transport pacing and teardown.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub write_chunk_size: usize,
    pub would_block_retry_delay: Duration,
    pub graceful_shutdown_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            write_chunk_size: 32 * 1024,
            would_block_retry_delay: Duration::from_millis(100),
            graceful_shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Seen-URL set bound, exposed as a knob rather than auto-derived from the
/// live window length.
#[derive(Debug, Clone)]
pub struct SeenSetConfig {
    pub capacity: usize,
}

impl Default for SeenSetConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

/// Top-level configuration shared (via `Arc`) across all Streams owned by a
/// Coordinator.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub fetch: FetchConfig,
    pub playlist: PlaylistConfig,
    pub downloader: DownloaderConfig,
    pub buffer: BufferConfig,
    pub player: PlayerConfig,
    pub seen_set: SeenSetConfig,
}
