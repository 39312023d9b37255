//! Ad-filter state machine.
//!
//! A pure function of parsed entries and their flags: no network access, no
//! playlist text. Two layers — a persistent `AdState` and a one-shot
//! `skip_next` — tolerate providers that emit only one of the SCTE-35 or
//! DATERANGE/heuristic marker families.

use super::playlist::{MediaPlaylist, SegmentEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdState {
    InContent,
    InAdBlock,
}

/// Decide which segments to keep, in playlist order. Idempotent: calling
/// this twice on the same playlist always yields the same keep-list, since
/// it's a pure fold over `entries`.
pub fn filter(playlist: &MediaPlaylist) -> Vec<(SegmentEntry, bool)> {
    let mut state = AdState::InContent;
    let mut skip_next = false;
    let mut out = Vec::with_capacity(playlist.segments.len());

    for entry in &playlist.segments {
        let flags = entry.flags;

        if flags.scte35_out {
            state = AdState::InAdBlock;
            skip_next = true;
        }
        if flags.scte35_in {
            state = AdState::InContent;
        }
        // EXT-X-DISCONTINUITY while InAdBlock: no state change.

        if flags.stitched_ad || flags.ad_duration_extinf {
            skip_next = true;
        }

        let keep = !(skip_next || state == AdState::InAdBlock);
        skip_next = false;

        out.push((entry.clone(), keep));
    }

    out
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::hls::playlist::{MediaPlaylist, SegmentEntry, SegmentFlags};
    use proptest::prelude::*;
    use url::Url;

    fn arb_flags() -> impl Strategy<Value = SegmentFlags> {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(scte35_out, scte35_in, discontinuity, stitched_ad, ad_duration_extinf)| SegmentFlags {
                    scte35_out,
                    scte35_in,
                    discontinuity,
                    stitched_ad,
                    ad_duration_extinf,
                },
            )
    }

    fn arb_playlist(len: usize) -> impl Strategy<Value = MediaPlaylist> {
        let base = Url::parse("https://example.com/media.m3u8").unwrap();
        prop::collection::vec(arb_flags(), len).prop_map(move |flags_vec| MediaPlaylist {
            target_duration: 2.0,
            media_sequence: 0,
            end_list: false,
            segments: flags_vec
                .into_iter()
                .enumerate()
                .map(|(i, flags)| SegmentEntry {
                    url: base.join(&format!("seg{i}.ts")).unwrap(),
                    duration: 2.0,
                    media_sequence_number: i as u64,
                    flags,
                })
                .collect(),
        })
    }

    proptest! {
        /// Running the filter twice on the same playlist yields the
        /// identical keep-list, for any combination of flags.
        #[test]
        fn filter_is_idempotent_over_arbitrary_flag_combinations(playlist in arb_playlist(12)) {
            let first: Vec<bool> = filter(&playlist).into_iter().map(|(_, keep)| keep).collect();
            let second: Vec<bool> = filter(&playlist).into_iter().map(|(_, keep)| keep).collect();
            prop_assert_eq!(first, second);
        }

        /// A segment whose own flags carry neither an ad marker nor an
        /// open `InAdBlock` state from a prior `scte35_out` is always kept.
        #[test]
        fn segment_with_no_markers_and_no_open_ad_block_is_kept(
            pairs in 0usize..3,
        ) {
            // `pairs` balanced scte35_out/scte35_in segments, so the ad-block
            // state is always closed again before the final clean segment.
            let prefix_len = pairs * 2;
            let base = Url::parse("https://example.com/media.m3u8").unwrap();
            let mut segments: Vec<SegmentEntry> = (0..prefix_len)
                .map(|i| SegmentEntry {
                    url: base.join(&format!("pre{i}.ts")).unwrap(),
                    duration: 2.0,
                    media_sequence_number: i as u64,
                    flags: if i % 2 == 0 {
                        SegmentFlags { scte35_out: true, ..SegmentFlags::default() }
                    } else {
                        SegmentFlags { scte35_in: true, ..SegmentFlags::default() }
                    },
                })
                .collect();
            segments.push(SegmentEntry {
                url: base.join("clean.ts").unwrap(),
                duration: 2.0,
                media_sequence_number: prefix_len as u64,
                flags: SegmentFlags::default(),
            });
            let playlist = MediaPlaylist {
                target_duration: 2.0,
                media_sequence: 0,
                end_list: false,
                segments,
            };
            let decisions = filter(&playlist);
            let (_, keep) = decisions.last().unwrap();
            prop_assert!(*keep);
        }
    }
}
