//! End-to-end tests driving `hls::stream::Stream` directly against a mock
//! HTTP origin and a real (trivial) child-process player, exercising the
//! same wiring `Coordinator::start_inner` uses without going through
//! channel-name resolution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tardsplaya_engine::config::{
    BufferConfig, DownloaderConfig, EngineConfig, FetchConfig, PlaylistConfig, SeenSetConfig,
};
use tardsplaya_engine::error::StreamErrorKind;
use tardsplaya_engine::fetcher::{build_client, Fetcher};
use tardsplaya_engine::hls::{Completion, Stream};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate, Respond};

/// Config tuned for fast, deterministic tests rather than production pacing.
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
        buffer: BufferConfig { target_depth: 3 },
        seen_set: SeenSetConfig { capacity: 10 },
        ..EngineConfig::default()
    }
}

fn fetcher() -> Arc<Fetcher> {
    let config = FetchConfig {
        max_attempts: 1,
        retry_delay: Duration::from_millis(5),
        ..FetchConfig::default()
    };
    let client = build_client(&config).expect("client builds");
    Arc::new(Fetcher::new(client, config))
}

async fn mount_segments(server: &MockServer, names: &[&str]) {
    for name in names {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"segment-bytes".to_vec()))
            .mount(server)
            .await;
    }
}

/// A playlist responder that grows across successive requests, simulating a
/// live stream that adds segments over time and eventually signals ENDLIST.
struct GrowingPlaylist {
    bodies: Vec<String>,
    calls: AtomicUsize,
}

impl GrowingPlaylist {
    fn new(bodies: Vec<String>) -> Self {
        Self {
            bodies,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for GrowingPlaylist {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.bodies.len() - 1);
        ResponseTemplate::new(200).set_body_string(self.bodies[index].clone())
    }
}

fn segment_line(seq: u64) -> String {
    format!("#EXTINF:2.0,\nseg{seq}.ts\n")
}

#[tokio::test]
async fn normal_live_stream_delivers_all_segments_then_ends() {
    let server = MockServer::start().await;
    mount_segments(&server, &["seg0.ts", "seg1.ts", "seg2.ts", "seg3.ts", "seg4.ts", "seg5.ts", "seg6.ts", "seg7.ts", "seg8.ts", "seg9.ts"]).await;

    let first: String = std::iter::once("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n".to_string())
        .chain((0..6).map(segment_line))
        .collect();
    let second: String = std::iter::once("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n".to_string())
        .chain((0..10).map(segment_line))
        .chain(std::iter::once("#EXT-X-ENDLIST\n".to_string()))
        .collect();

    Mock::given(method("GET"))
        .and(path("/media.m3u8"))
        .respond_with(GrowingPlaylist::new(vec![first, second]))
        .mount(&server)
        .await;

    let media_url = Url::parse(&format!("{}/media.m3u8", server.uri())).unwrap();
    let output = tempfile::NamedTempFile::new().unwrap();
    let output_path = output.path().to_path_buf();

    let stream = Stream::start(
        media_url,
        fetcher(),
        fast_config(),
        "sh".to_string(),
        vec!["-c".to_string(), format!("cat > {}", output_path.display())],
    )
    .expect("stream starts");

    let completion = tokio::time::timeout(Duration::from_secs(10), stream.join())
        .await
        .expect("stream finishes within the test deadline");

    assert_eq!(completion, Completion::NormalEnd);
    let written = tokio::fs::read(&output_path).await.unwrap();
    assert_eq!(written.len(), "segment-bytes".len() * 10);
}

#[tokio::test]
async fn cancelling_the_stream_token_stops_it_with_user_cancel() {
    let server = MockServer::start().await;
    mount_segments(&server, &["seg0.ts", "seg1.ts"]).await;

    // A playlist that never reaches ENDLIST, so the only way out is cancellation.
    let body: String = std::iter::once("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n".to_string())
        .chain((0..2).map(segment_line))
        .collect();
    Mock::given(method("GET"))
        .and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let media_url = Url::parse(&format!("{}/media.m3u8", server.uri())).unwrap();

    let stream = Stream::start(
        media_url,
        fetcher(),
        fast_config(),
        "sh".to_string(),
        vec!["-c".to_string(), "cat > /dev/null".to_string()],
    )
    .expect("stream starts");

    let token = stream.cancel_token();
    let join_handle = tokio::spawn(stream.join());

    tokio::time::sleep(Duration::from_millis(150)).await;
    token.cancel();

    let completion = tokio::time::timeout(Duration::from_secs(10), join_handle)
        .await
        .expect("stream finishes within the test deadline")
        .expect("join task does not panic");

    assert_eq!(completion, Completion::UserCancel);
}

#[tokio::test]
async fn player_exiting_early_surfaces_as_disconnect() {
    let server = MockServer::start().await;
    mount_segments(&server, &["seg0.ts", "seg1.ts", "seg2.ts"]).await;

    let body: String = std::iter::once("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n".to_string())
        .chain((0..3).map(segment_line))
        .chain(std::iter::once("#EXT-X-ENDLIST\n".to_string()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let media_url = Url::parse(&format!("{}/media.m3u8", server.uri())).unwrap();

    // Exits immediately; by the time a segment chunk is ready to write, its
    // stdin pipe's read end is already closed.
    let stream = Stream::start(
        media_url,
        fetcher(),
        fast_config(),
        "sh".to_string(),
        vec!["-c".to_string(), "exit 0".to_string()],
    )
    .expect("stream starts");

    let completion = tokio::time::timeout(Duration::from_secs(10), stream.join())
        .await
        .expect("stream finishes within the test deadline");

    assert_eq!(completion, Completion::Error(StreamErrorKind::Disconnect));
}

#[tokio::test]
async fn repeated_playlist_fetch_failures_give_up_after_the_error_cap() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let media_url = Url::parse(&format!("{}/media.m3u8", server.uri())).unwrap();

    let stream = Stream::start(
        media_url,
        fetcher(),
        fast_config(),
        "sh".to_string(),
        vec!["-c".to_string(), "cat > /dev/null".to_string()],
    )
    .expect("stream starts");

    let completion = tokio::time::timeout(Duration::from_secs(10), stream.join())
        .await
        .expect("stream finishes within the test deadline");

    assert_eq!(completion, Completion::Error(StreamErrorKind::RepeatedFetch));
}
