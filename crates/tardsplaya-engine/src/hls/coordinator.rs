//! Coordinator.
//!
//! Owns the channel registry, enforces single-instance-per-channel, and
//! wires a resolved master playlist into a running `Stream`. Never retries
//! anything itself — retry policy lives entirely inside the fetcher and
//! downloader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::buffer::ChunkCount;
use super::playlist::parse_master;
use super::stream::{Completion, Stream};
use crate::channel::ChannelName;
use crate::config::EngineConfig;
use crate::error::StartError;
use crate::fetcher::{build_client, Fetcher};
use crate::PlaylistResolver;

/// A lightweight, cloneable reference to a running stream kept in the
/// registry once the heavy `Stream` itself has moved into its supervisor
/// task: the registry entry, not the Stream's full worker set, is what the
/// Coordinator's lock protects.
struct StreamHandle {
    cancel: CancellationToken,
    depth: Arc<ChunkCount>,
}

/// A fully started `Stream`, carried from `start_inner` back to `start` so
/// the registry entry can be swapped from its reservation to the real
/// handle in one short lock acquisition.
struct StartedStream {
    stream: Stream,
}

impl StartedStream {
    fn registry_handle(&self) -> StreamHandle {
        StreamHandle {
            cancel: self.stream.cancel_token(),
            depth: self.stream.depth_handle(),
        }
    }
}

pub struct Coordinator {
    fetcher: Arc<Fetcher>,
    resolver: Arc<dyn PlaylistResolver>,
    config: EngineConfig,
    streams: Mutex<HashMap<ChannelName, StreamHandle>>,
    active_count: AtomicUsize,
}

impl Coordinator {
    pub fn new(
        resolver: Arc<dyn PlaylistResolver>,
        config: EngineConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_client(&config.fetch)?;
        Ok(Self {
            fetcher: Arc::new(Fetcher::new(client, config.fetch.clone())),
            resolver,
            config,
            streams: Mutex::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        })
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Resolves `channel`, selects `quality_label` from its master playlist,
    /// and starts a Stream piping into `player_command`. Takes
    /// `self: &Arc<Self>` because the spawned supervisor task needs a
    /// `'static` handle back to the registry to remove its own entry on
    /// completion.
    pub async fn start(
        self: &Arc<Self>,
        channel: ChannelName,
        quality_label: &str,
        player_command: String,
        player_args: Vec<String>,
    ) -> Result<(), StartError> {
        // Reserve the slot under the lock, then release it before any I/O:
        // the registry mutex is never held across I/O. The reservation
        // itself is what enforces single-instance-per-channel against a
        // concurrent `start` for the same channel; it is backed out again on
        // any failure before the real Stream is inserted in its place.
        {
            let mut streams = self.streams.lock().await;
            if streams.contains_key(&channel) {
                return Err(StartError::AlreadyRunning(channel));
            }
            streams.insert(
                channel.clone(),
                StreamHandle {
                    cancel: CancellationToken::new(),
                    depth: Arc::new(ChunkCount::default()),
                },
            );
        }

        let result = self
            .start_inner(&channel, quality_label, player_command, player_args)
            .await;

        let handle = match result {
            Ok(handle) => handle,
            Err(err) => {
                let mut streams = self.streams.lock().await;
                streams.remove(&channel);
                return Err(err);
            }
        };

        let mut streams = self.streams.lock().await;
        // A `stop` that raced the reservation above cancelled a token nobody
        // was driving yet; honor it against the real stream instead.
        let stop_raced_us = streams
            .get(&channel)
            .is_some_and(|reservation| reservation.cancel.is_cancelled());
        streams.insert(channel.clone(), handle.registry_handle());
        drop(streams);
        self.active_count.fetch_add(1, Ordering::AcqRel);

        let stream = handle.stream;
        if stop_raced_us {
            stream.cancel();
        }
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let completion = stream.join().await;
            match completion {
                Completion::NormalEnd => {
                    info!(target: "tardsplaya::lifecycle", channel = %channel, "stream ended normally")
                }
                Completion::UserCancel => {
                    info!(target: "tardsplaya::lifecycle", channel = %channel, "stream cancelled")
                }
                Completion::Error(kind) => {
                    warn!(target: "tardsplaya::lifecycle", channel = %channel, error = %kind, "stream terminated with error")
                }
            }
            let mut streams = coordinator.streams.lock().await;
            streams.remove(&channel);
            coordinator.active_count.fetch_sub(1, Ordering::AcqRel);
        });

        Ok(())
    }

    /// Does the actual resolve → parse → variant-select → spawn work, with
    /// no lock held. Lives behind the reservation `start` installs first.
    async fn start_inner(
        &self,
        channel: &ChannelName,
        quality_label: &str,
        player_command: String,
        player_args: Vec<String>,
    ) -> Result<StartedStream, StartError> {
        let master_url = self
            .resolver
            .resolve(channel)
            .await
            .map_err(|reason| StartError::Resolve { reason })?;

        let cancel = CancellationToken::new();
        let body = self
            .fetcher
            .get_text(&master_url, &cancel)
            .await
            .map_err(|e| StartError::Resolve {
                reason: e.to_string(),
            })?;
        let variants = parse_master(&body, &master_url).map_err(|e| StartError::Resolve {
            reason: e.to_string(),
        })?;

        let variant = variants
            .into_iter()
            .find(|v| v.quality_label == quality_label)
            .ok_or_else(|| StartError::UnknownQuality {
                label: quality_label.to_string(),
            })?;

        let stream = Stream::start(
            variant.media_url,
            Arc::clone(&self.fetcher),
            self.config.clone(),
            player_command,
            player_args,
        )
        .map_err(|_| StartError::PlayerLaunch {
            reason: "failed to launch player".to_string(),
        })?;

        Ok(StartedStream { stream })
    }

    /// Requests cancellation of a running channel's stream; the registry
    /// entry is removed by the stream's own supervisor task once it drains.
    pub async fn stop(&self, channel: &ChannelName) -> bool {
        let streams = self.streams.lock().await;
        if let Some(handle) = streams.get(channel) {
            handle.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub async fn stop_all(&self) {
        let streams = self.streams.lock().await;
        for handle in streams.values() {
            handle.cancel.cancel();
        }
    }

    pub async fn chunk_count(&self, channel: &ChannelName) -> Option<usize> {
        let streams = self.streams.lock().await;
        streams.get(channel).map(|h| h.depth.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BufferConfig, DownloaderConfig, FetchConfig, PlaylistConfig, SeenSetConfig};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> EngineConfig {
        EngineConfig {
            fetch: FetchConfig {
                max_attempts: 1,
                retry_delay: Duration::from_millis(5),
                attempt_timeout: Duration::from_secs(2),
                ..FetchConfig::default()
            },
            playlist: PlaylistConfig {
                poll_interval: Duration::from_millis(30),
                error_retry_delay: Duration::from_millis(10),
                max_consecutive_errors: 2,
                backpressure_retry_delay: Duration::from_millis(20),
            },
            downloader: DownloaderConfig {
                max_attempts: 1,
                retry_delay: Duration::from_millis(5),
            },
            buffer: BufferConfig { target_depth: 2 },
            seen_set: SeenSetConfig { capacity: 10 },
            ..EngineConfig::default()
        }
    }

    /// Resolves any channel name to a fixed URL, for pointing every started
    /// stream at the same mock server.
    struct FixedUrlResolver(Url);

    #[async_trait::async_trait]
    impl PlaylistResolver for FixedUrlResolver {
        async fn resolve(&self, _channel: &ChannelName) -> Result<Url, String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn starting_an_already_running_channel_is_rejected_without_disturbing_it() {
        let server = MockServer::start().await;
        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:2.0,\nseg0.ts\n";
        Mock::given(method("GET"))
            .and(path("/media.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/seg0.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bytes".to_vec()))
            .mount(&server)
            .await;

        let media_url = Url::parse(&format!("{}/media.m3u8", server.uri())).unwrap();
        let resolver = Arc::new(FixedUrlResolver(media_url));
        let coordinator = Arc::new(Coordinator::new(resolver, fast_config()).unwrap());

        let channel = ChannelName::new("some-channel").unwrap();
        coordinator
            .start(
                channel.clone(),
                "source",
                "sh".to_string(),
                vec!["-c".to_string(), "cat > /dev/null".to_string()],
            )
            .await
            .expect("first start succeeds");

        assert_eq!(coordinator.active_count(), 1);

        let second = coordinator
            .start(
                channel.clone(),
                "source",
                "sh".to_string(),
                vec!["-c".to_string(), "cat > /dev/null".to_string()],
            )
            .await;
        assert!(matches!(second, Err(StartError::AlreadyRunning(_))));
        assert_eq!(coordinator.active_count(), 1);

        coordinator.stop(&channel).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(coordinator.active_count(), 0);
    }

    #[tokio::test]
    async fn unknown_quality_label_is_rejected_synchronously() {
        let server = MockServer::start().await;
        let master_body =
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1,VIDEO=\"720p\"\nvariant.m3u8\n";
        Mock::given(method("GET"))
            .and(path("/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(master_body))
            .mount(&server)
            .await;

        let master_url = Url::parse(&format!("{}/master.m3u8", server.uri())).unwrap();
        let resolver = Arc::new(FixedUrlResolver(master_url));
        let coordinator = Arc::new(Coordinator::new(resolver, fast_config()).unwrap());

        let channel = ChannelName::new("another-channel").unwrap();
        let result = coordinator
            .start(channel, "1080p", "sh".to_string(), vec![])
            .await;
        assert!(matches!(result, Err(StartError::UnknownQuality { .. })));
        assert_eq!(coordinator.active_count(), 0);
    }
}
