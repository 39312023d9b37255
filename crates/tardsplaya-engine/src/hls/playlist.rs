//! Master and media M3U8 parsing.
//!
//! Parsing and ad-filtering are kept separate: this module only recognizes
//! tags and produces neutral `SegmentEntry` values carrying `flags`; the
//! ad-filter state machine (`super::ad_filter`) is the only thing that reads
//! those flags.
//!
//! Structural parsing (variants, segments, durations, discontinuities) is
//! delegated to `m3u8-rs`. The bare `#EXT-X-SCTE35-OUT`/`#EXT-X-SCTE35-IN`
//! markers and the free-form `stitched`/DATERANGE ad heuristics are not part
//! of the HLS spec `m3u8-rs` models, so those are recovered with a small
//! raw-line pass over the same body and merged onto the segments `m3u8-rs`
//! produced.

use std::collections::BTreeMap;

use m3u8_rs::Playlist;
use url::Url;

/// One variant stream listed in a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub quality_label: String,
    pub media_url: Url,
    pub bandwidth: Option<u64>,
    pub resolution: Option<String>,
}

/// Flags attached to a `SegmentEntry` by the parser; consumed by the C3
/// ad-filter. None of these by themselves imply `keep == false` — that
/// decision is the filter's alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentFlags {
    pub scte35_out: bool,
    pub scte35_in: bool,
    pub discontinuity: bool,
    pub stitched_ad: bool,
    pub ad_duration_extinf: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    pub url: Url,
    pub duration: f32,
    pub media_sequence_number: u64,
    pub flags: SegmentFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub target_duration: f32,
    pub media_sequence: u64,
    pub end_list: bool,
    pub segments: Vec<SegmentEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaylistParseError {
    #[error("playlist body is empty")]
    Empty,
    #[error("not a valid M3U8 body (missing #EXTM3U)")]
    NotM3u8,
    #[error("invalid URL `{url}` relative to `{base}`: {source}")]
    InvalidUrl {
        url: String,
        base: String,
        source: url::ParseError,
    },
}

fn resolve(base: &Url, line: &str) -> Result<Url, PlaylistParseError> {
    base.join(line).map_err(|source| PlaylistParseError::InvalidUrl {
        url: line.to_string(),
        base: base.to_string(),
        source,
    })
}

fn parse(body: &str) -> Result<Playlist, PlaylistParseError> {
    if body.trim().is_empty() {
        return Err(PlaylistParseError::Empty);
    }
    if !body.trim_start().starts_with("#EXTM3U") {
        return Err(PlaylistParseError::NotM3u8);
    }
    m3u8_rs::parse_playlist_res(body.as_bytes()).map_err(|_| PlaylistParseError::NotM3u8)
}

/// Parse a master playlist into its variants.
///
/// A media playlist handed to this function (no `#EXT-X-STREAM-INF` lines)
/// synthesizes a single variant under the key `source`, matching how a
/// single-quality channel's "master" URL is in practice already its media
/// playlist.
pub fn parse_master(body: &str, master_url: &Url) -> Result<Vec<Variant>, PlaylistParseError> {
    match parse(body)? {
        Playlist::MasterPlaylist(master) => {
            let mut variants: BTreeMap<String, Variant> = BTreeMap::new();
            for v in &master.variants {
                let media_url = resolve(master_url, &v.uri)?;
                let quality_label = v.video.clone().unwrap_or_else(|| "unknown".to_string());
                let resolution = v.resolution.map(|r| format!("{}x{}", r.width, r.height));
                variants.insert(
                    quality_label.clone(),
                    Variant {
                        quality_label,
                        media_url,
                        bandwidth: Some(v.bandwidth),
                        resolution,
                    },
                );
            }
            Ok(variants.into_values().collect())
        }
        Playlist::MediaPlaylist(_) => Ok(vec![Variant {
            quality_label: "source".to_string(),
            media_url: master_url.clone(),
            bandwidth: None,
            resolution: None,
        }]),
    }
}

/// Bare `2.001`/`2.002` second durations are the Twitch/Amazon ad-stitcher's
/// own tell, independent of any explicit marker tag.
fn is_bare_ad_duration(duration: f32) -> bool {
    const EPSILON: f32 = 0.0005;
    (duration - 2.001).abs() < EPSILON || (duration - 2.002).abs() < EPSILON
}

/// Recovers the non-standard SCTE-35 bare tags and the free-form
/// `stitched`/DATERANGE ad substrings by walking the raw body one line at a
/// time, in playlist order — the same order `m3u8-rs` yields its segments
/// in. Neither of these is part of the HLS grammar `m3u8-rs` models:
/// SCTE-35 bare tags aren't a real tag at all, and the `stitched` markers are
/// provider-specific text embedded inside otherwise-standard tag bodies or
/// segment URIs.
fn raw_custom_flags(body: &str) -> Vec<SegmentFlags> {
    let mut flags = Vec::new();
    let mut pending = SegmentFlags::default();

    for raw_line in body.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("#EXT-X-SCTE35-OUT") {
            pending.scte35_out = true;
            continue;
        }
        if line.starts_with("#EXT-X-SCTE35-IN") {
            pending.scte35_in = true;
            continue;
        }
        if line.starts_with("#EXT-X-DATERANGE:") {
            if line.contains("stitched-ad") || line.contains("MIDROLL") || line.contains("midroll") {
                pending.stitched_ad = true;
            }
            continue;
        }
        if line.starts_with('#') {
            if line.contains("stitched-ad") || line.contains("stitched") || line.contains("STITCHED") {
                pending.stitched_ad = true;
            }
            continue;
        }

        // Non-tag, non-empty line: a segment URI.
        if line.contains("stitched-ad") || line.contains("stitched") || line.contains("STITCHED") {
            pending.stitched_ad = true;
        }
        flags.push(pending);
        pending = SegmentFlags::default();
    }

    flags
}

/// Parse a media playlist into its segment entries.
///
/// This is purely structural: a segment's flags are populated here but no
/// segment is dropped — that is the ad-filter's job.
pub fn parse_media(body: &str, media_url: &Url) -> Result<MediaPlaylist, PlaylistParseError> {
    let playlist = match parse(body)? {
        Playlist::MediaPlaylist(playlist) => playlist,
        Playlist::MasterPlaylist(_) => return Err(PlaylistParseError::NotM3u8),
    };

    let custom_flags = raw_custom_flags(body);
    let mut segments = Vec::with_capacity(playlist.segments.len());

    for (i, segment) in playlist.segments.iter().enumerate() {
        let url = resolve(media_url, &segment.uri)?;
        let mut flags = custom_flags.get(i).copied().unwrap_or_default();
        flags.discontinuity = segment.discontinuity;
        flags.ad_duration_extinf = is_bare_ad_duration(segment.duration);

        segments.push(SegmentEntry {
            url,
            duration: segment.duration,
            media_sequence_number: playlist.media_sequence + i as u64,
            flags,
        });
    }

    Ok(MediaPlaylist {
        target_duration: playlist.target_duration,
        media_sequence: playlist.media_sequence,
        end_list: playlist.end_list,
        segments,
    })
}
