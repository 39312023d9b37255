//! Error taxonomy for the ingestion pipeline.
//!
//! Each stage gets its own error enum rather than a single catch-all:
//! `FetchError` covers HTTP retries, `IpcError` covers player-pipe writes,
//! and `StreamErrorKind` is the terminal classification folded into a
//! Stream's completion signal.

use crate::retry::Retryable;
use reqwest::StatusCode;

/// Errors from the HTTP fetcher.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,

    #[error("network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request timed out")]
    Timeout,

    #[error("server returned HTTP {0}")]
    Http(StatusCode),

    #[error("response body could not be parsed as a playlist: {reason}")]
    ParseRejected { reason: String },

    #[error("I/O error reading response body: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Network errors, timeouts, and 5xx responses are worth another attempt;
    /// cancellation and 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled => false,
            Self::Http(status) => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
            Self::ParseRejected { .. } => false,
            Self::Network { source } => {
                source.is_connect() || source.is_timeout() || source.is_request() || source.is_body() || source.is_decode()
            }
            Self::Timeout | Self::Io { .. } => true,
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.is_retryable()
    }
}

/// Errors from the player IPC transport.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("player pipe disconnected")]
    Disconnected,

    #[error("write cancelled")]
    Cancelled,

    #[error("failed to launch player: {reason}")]
    Launch { reason: String },

    #[error("I/O error writing to player stdin: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl IpcError {
    /// Turn an I/O error from a pipe write into the terminal `Disconnected`
    /// variant when it is in fact a broken pipe, leaving other I/O errors
    /// as retryable-at-the-caller's-discretion `Io`.
    pub fn from_write_error(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            Self::Disconnected
        } else {
            Self::Io { source: err }
        }
    }
}

/// Terminal classification of a Stream's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamErrorKind {
    #[error("failed to resolve master playlist")]
    Resolve,
    #[error("requested quality label is not present in the master playlist")]
    UnknownQuality,
    #[error("consecutive playlist fetch failures exceeded the cap")]
    RepeatedFetch,
    #[error("player consumer disconnected")]
    Disconnect,
    #[error("failed to launch the player process")]
    PlayerLaunch,
    #[error("internal error")]
    Internal,
}

/// Synchronous failures surfaced directly to the caller of `Coordinator::start`.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("channel {0:?} is already running")]
    AlreadyRunning(crate::channel::ChannelName),

    #[error("failed to resolve master playlist: {reason}")]
    Resolve { reason: String },

    #[error("quality label {label:?} is not one of the master playlist's variants")]
    UnknownQuality { label: String },

    #[error("failed to launch player: {reason}")]
    PlayerLaunch { reason: String },
}
