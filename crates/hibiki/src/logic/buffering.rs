use crate::options::StreamingOptions;
use crate::playlist::{Playlist, PlaylistProps, RepresentationKey};
use crate::time::{ticks_from_seconds, Tick};

pub const BUFFERING_LOWEST_LIMIT: Tick = ticks_from_seconds(2);
pub const DEFAULT_MIN_BUFFERING: Tick = ticks_from_seconds(6);
pub const DEFAULT_MAX_BUFFERING: Tick = ticks_from_seconds(30);
pub const DEFAULT_LIVE_BUFFERING: Tick = ticks_from_seconds(15);

/// Segments kept between the chosen start point and the live edge.
const SAFETY_BUFFERING_EDGE_OFFSET: u64 = 1;

/// Buffering targets for a presentation.
///
/// Manifest hints propose, user overrides dispose; everything is floored
/// so a hostile manifest can never talk the player into a sub-2s buffer
/// outside of low-latency mode.
#[derive(Debug, Default)]
pub struct BufferingLogic {
    user_min: Option<Tick>,
    user_max: Option<Tick>,
    user_live_delay: Option<Tick>,
    user_low_latency: Option<bool>,
}

impl BufferingLogic {
    pub fn from_options(options: &StreamingOptions) -> Self {
        Self {
            user_min: options.min_buffering,
            user_max: options.max_buffering,
            user_live_delay: options.live_delay,
            user_low_latency: options.low_latency,
        }
    }

    pub fn is_low_latency(&self, props: &PlaylistProps) -> bool {
        self.user_low_latency.unwrap_or(props.low_latency)
    }

    pub fn min_buffering(&self, props: &PlaylistProps) -> Tick {
        if self.is_low_latency(props) {
            return BUFFERING_LOWEST_LIMIT;
        }
        let min = self
            .user_min
            .or(props.min_buffer_hint)
            .unwrap_or(DEFAULT_MIN_BUFFERING);
        min.max(BUFFERING_LOWEST_LIMIT)
    }

    pub fn max_buffering(&self, props: &PlaylistProps) -> Tick {
        if self.is_low_latency(props) {
            return self.min_buffering(props);
        }
        let mut max = self
            .user_max
            .or(props.max_buffer_hint)
            .unwrap_or(DEFAULT_MAX_BUFFERING);
        if props.is_live {
            max = max.min(self.live_delay(props));
        }
        max.max(self.min_buffering(props))
    }

    /// Distance to keep behind the live edge.
    pub fn live_delay(&self, props: &PlaylistProps) -> Tick {
        if self.is_low_latency(props) {
            return BUFFERING_LOWEST_LIMIT;
        }
        let mut delay = match self.user_live_delay {
            Some(user) => user,
            None => {
                let mut delay = props
                    .suggested_presentation_delay
                    .unwrap_or(DEFAULT_LIVE_BUFFERING);
                if let Some(max_segment) = props.max_segment_duration {
                    delay = delay.max(3 * max_segment);
                }
                delay
            }
        };
        if let Some(depth) = props.time_shift_buffer_depth {
            delay = delay.min(depth);
        }
        delay.max(self.min_buffering(props))
    }

    /// Level the buffering loop aims to hold once playback is steady.
    pub fn stable_buffering(&self, props: &PlaylistProps) -> Tick {
        let min = self.min_buffering(props);
        let max = self.max_buffering(props);
        ((min + max) / 2).clamp(min, max)
    }

    /// First segment to request. On-demand starts at the front; live backs
    /// off from the edge by the live delay, one safety segment short of the
    /// newest one.
    pub fn start_segment_number(
        &self,
        playlist: &Playlist,
        key: RepresentationKey,
        now: Tick,
    ) -> u64 {
        let first = playlist.start_segment_number(key);
        if !playlist.props.is_live {
            return first;
        }

        let Some(edge) = playlist
            .last_segment_number(key)
            .or_else(|| playlist.live_template_number(key, now))
        else {
            return first;
        };
        let edge = edge
            .saturating_sub(SAFETY_BUFFERING_EDGE_OFFSET)
            .max(first);

        // walk back from the edge until the live delay is covered
        let delay = self.live_delay(&playlist.props);
        let mut number = edge;
        let mut covered: Tick = 0;
        while number > first && covered < delay {
            match playlist.playback_time_duration(key, number) {
                Some((_, duration)) => covered += duration,
                None => break,
            }
            number -= 1;
        }
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{
        AdaptationSet, Payload, Period, PlaylistProps, Segment, SegmentList,
    };
    use crate::time::Timescale;

    #[test]
    fn test_defaults() {
        let logic = BufferingLogic::default();
        let props = PlaylistProps::default();
        assert_eq!(logic.min_buffering(&props), DEFAULT_MIN_BUFFERING);
        assert_eq!(logic.max_buffering(&props), DEFAULT_MAX_BUFFERING);
        assert_eq!(logic.live_delay(&props), DEFAULT_LIVE_BUFFERING);
    }

    #[test]
    fn test_user_overrides_win_over_hints() {
        let logic = BufferingLogic {
            user_min: Some(ticks_from_seconds(10)),
            user_live_delay: Some(ticks_from_seconds(8)),
            ..Default::default()
        };
        let props = PlaylistProps {
            min_buffer_hint: Some(ticks_from_seconds(4)),
            suggested_presentation_delay: Some(ticks_from_seconds(20)),
            is_live: true,
            ..Default::default()
        };
        assert_eq!(logic.min_buffering(&props), ticks_from_seconds(10));
        // user delay below min buffering gets floored to it
        assert_eq!(logic.live_delay(&props), ticks_from_seconds(10));
    }

    #[test]
    fn test_hostile_manifest_cannot_dig_under_floor() {
        let logic = BufferingLogic::default();
        let props = PlaylistProps {
            min_buffer_hint: Some(ticks_from_seconds(0)),
            ..Default::default()
        };
        assert_eq!(logic.min_buffering(&props), BUFFERING_LOWEST_LIMIT);
    }

    #[test]
    fn test_live_delay_from_manifest() {
        let logic = BufferingLogic::default();
        let props = PlaylistProps {
            is_live: true,
            suggested_presentation_delay: Some(ticks_from_seconds(9)),
            time_shift_buffer_depth: Some(ticks_from_seconds(8)),
            ..Default::default()
        };
        // suggested delay clamped by the time shift window
        assert_eq!(logic.live_delay(&props), ticks_from_seconds(8));
        assert_eq!(logic.max_buffering(&props), ticks_from_seconds(8));

        let props = PlaylistProps {
            is_live: true,
            max_segment_duration: Some(ticks_from_seconds(6)),
            ..Default::default()
        };
        assert_eq!(logic.live_delay(&props), ticks_from_seconds(18));
    }

    #[test]
    fn test_low_latency_floors_everything() {
        let logic = BufferingLogic {
            user_low_latency: Some(true),
            ..Default::default()
        };
        let props = PlaylistProps {
            is_live: true,
            suggested_presentation_delay: Some(ticks_from_seconds(20)),
            ..Default::default()
        };
        assert_eq!(logic.min_buffering(&props), BUFFERING_LOWEST_LIMIT);
        assert_eq!(logic.live_delay(&props), BUFFERING_LOWEST_LIMIT);
        assert_eq!(logic.max_buffering(&props), BUFFERING_LOWEST_LIMIT);
    }

    #[test]
    fn test_live_start_backs_off_from_edge() {
        let mut playlist = Playlist::new(PlaylistProps {
            is_live: true,
            ..Default::default()
        });
        let p = playlist.add_period(Period::default());
        let s = playlist.add_adaptation_set(p, AdaptationSet::default());
        let key = playlist.add_representation(p, s, "a", 1_000_000);
        let node = playlist.representation(key).unwrap().node;
        playlist.tree_mut().set_timescale(node, Timescale::new(1));
        let mut list = SegmentList::new(true);
        for i in 0..20 {
            // 2-second segments
            list.add_segment(Segment::new(i, i as i64 * 2, 2));
        }
        playlist.tree_mut().attach_payload(node, Payload::List(list));

        let logic = BufferingLogic {
            user_live_delay: Some(ticks_from_seconds(6)),
            ..Default::default()
        };
        // edge is 19, safety leaves 18, 6s of delay walks back 3 segments
        let start = logic.start_segment_number(&playlist, key, 0);
        assert_eq!(start, 15);

        // on-demand ignores the edge entirely
        playlist.props.is_live = false;
        assert_eq!(logic.start_segment_number(&playlist, key, 0), 0);
    }
}
