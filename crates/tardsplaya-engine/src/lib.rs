//! Multi-stream live HLS ingestion and player-dispatch engine.
//!
//! Entry point is [`coordinator::Coordinator`]: it resolves a channel to a
//! master playlist via a caller-supplied [`PlaylistResolver`], picks a
//! variant, and starts a [`hls::stream::Stream`] that pipes live segments
//! into an external player process.

pub mod channel;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod hls;
pub mod retry;

use async_trait::async_trait;
use url::Url;

use channel::ChannelName;

/// Opaque collaborator resolving a channel name to a master playlist URL.
/// The engine never talks to a specific provider's auth flow; callers supply one.
#[async_trait]
pub trait PlaylistResolver: Send + Sync {
    async fn resolve(&self, channel: &ChannelName) -> Result<Url, String>;
}

/// Reference resolver for tests and simple CLI use: the channel name already
/// is the master playlist URL.
pub struct StaticResolver;

#[async_trait]
impl PlaylistResolver for StaticResolver {
    async fn resolve(&self, channel: &ChannelName) -> Result<Url, String> {
        Url::parse(channel.as_str()).map_err(|e| e.to_string())
    }
}
