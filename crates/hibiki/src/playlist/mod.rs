//! Manifest object model.
//!
//! A [`Playlist`] owns the attribute tree plus the period / adaptation set /
//! representation hierarchy built on top of it. Representations address
//! their media through whichever segment profile resolves for their node;
//! callers never see which profile kind is in effect.

pub mod attrs;
pub mod segment;
pub mod segment_base;
pub mod segment_list;
pub mod template;
pub mod timeline;

use url::Url;

use crate::error::{HibikiError, HibikiResult};
use crate::time::Tick;

pub use crate::playlist::attrs::{
    AttrValue, AttrsTree, NodeId, NodeType, Payload, TemplateContext,
};
pub use crate::playlist::segment::{
    ByteRange, EncryptionDescriptor, EncryptionMethod, IndexSegment, InitSegment, Segment,
    SplitPoint,
};
pub use crate::playlist::segment_base::SegmentBase;
pub use crate::playlist::segment_list::SegmentList;
pub use crate::playlist::template::SegmentTemplate;
pub use crate::playlist::timeline::SegmentTimeline;

const MAX_UPDATE_FAILURES: u32 = 3;

/// Container format of a representation's segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    Fmp4,
    MpegTs,
    WebM,
    Ogg,
    WebVtt,
    Ttml,
    PackedAudio,
    #[default]
    Unknown,
}

impl StreamFormat {
    /// Guess from a mime type string, falling back to `Unknown`.
    pub fn from_mime_type(mime: &str) -> Self {
        let (kind, subtype) = match mime.split_once('/') {
            Some(parts) => parts,
            None => return StreamFormat::Unknown,
        };
        match (kind, subtype) {
            (_, "mp4") => StreamFormat::Fmp4,
            (_, "mp2t") => StreamFormat::MpegTs,
            (_, "webm") => StreamFormat::WebM,
            (_, "ogg") => StreamFormat::Ogg,
            ("text", "vtt") => StreamFormat::WebVtt,
            ("application", "ttml+xml") => StreamFormat::Ttml,
            ("audio", "aac") | ("audio", "ac3") | ("audio", "mpeg") => StreamFormat::PackedAudio,
            _ => StreamFormat::Unknown,
        }
    }
}

/// Coordinates of a representation inside a playlist. Stable across live
/// refreshes as long as the manifest keeps its structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepresentationKey {
    pub period: usize,
    pub set: usize,
    pub representation: usize,
}

/// Consecutive segment failures a representation may accumulate before
/// adaptation stops considering it.
const MAX_SEGMENT_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct Representation {
    pub(crate) node: NodeId,
    pub id: String,
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codecs: Option<String>,
    pub format: StreamFormat,
    pub base_url: Option<Url>,
    pub encryption: Option<EncryptionDescriptor>,
    pub index_segment: Option<IndexSegment>,
    failures: u32,
}

impl Representation {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// A representation stays a switch candidate until it burns its
    /// failure budget.
    pub fn is_usable(&self) -> bool {
        self.failures < MAX_SEGMENT_FAILURES
    }

    /// Returns true when this failure exhausted the budget.
    pub(crate) fn record_failure(&mut self) -> bool {
        self.failures += 1;
        !self.is_usable()
    }

    pub(crate) fn record_success(&mut self) {
        self.failures = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptationSet {
    pub(crate) node: Option<NodeId>,
    pub id: Option<String>,
    pub lang: Option<String>,
    pub base_url: Option<Url>,
    pub encryption: Option<EncryptionDescriptor>,
    representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    /// Highest-bandwidth representation, if any.
    pub fn best(&self) -> Option<&Representation> {
        self.representations.last()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Period {
    pub(crate) node: Option<NodeId>,
    pub start: Option<Tick>,
    pub duration: Option<Tick>,
    pub base_url: Option<Url>,
    pub sets: Vec<AdaptationSet>,
}

/// Presentation-level properties a live session schedules around.
#[derive(Debug, Clone, Default)]
pub struct PlaylistProps {
    pub url: Option<Url>,
    pub is_live: bool,
    pub low_latency: bool,
    pub min_buffer_hint: Option<Tick>,
    pub max_buffer_hint: Option<Tick>,
    pub suggested_presentation_delay: Option<Tick>,
    pub time_shift_buffer_depth: Option<Tick>,
    pub minimum_update_period: Option<Tick>,
    pub max_segment_duration: Option<Tick>,
    pub availability_start_time: Option<Tick>,
    pub needs_updates: bool,
}

/// Which addressing profile a representation ends up using. Template wins
/// over an explicit list, which wins over a single indexed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileRef {
    Template(NodeId),
    List(NodeId),
    Base(NodeId),
}

#[derive(Debug, Default)]
pub struct Playlist {
    tree: AttrsTree,
    root: Option<NodeId>,
    periods: Vec<Period>,
    pub props: PlaylistProps,
    update_failures: u32,
}

impl Playlist {
    pub fn new(props: PlaylistProps) -> Self {
        Self {
            props,
            ..Default::default()
        }
    }

    pub fn tree(&self) -> &AttrsTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut AttrsTree {
        &mut self.tree
    }

    pub fn root(&mut self) -> NodeId {
        match self.root {
            Some(id) => id,
            None => {
                let id = self.tree.add_node(None, NodeType::SegmentInformation);
                self.root = Some(id);
                id
            }
        }
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn add_period(&mut self, mut period: Period) -> usize {
        if period.node.is_none() {
            let root = self.root();
            period.node = Some(self.tree.add_node(Some(root), NodeType::SegmentInformation));
        }
        self.periods.push(period);
        self.periods.len() - 1
    }

    pub fn add_adaptation_set(&mut self, period: usize, mut set: AdaptationSet) -> usize {
        let parent = self.periods[period].node;
        if set.node.is_none() {
            set.node = Some(self.tree.add_node(parent, NodeType::SegmentInformation));
        }
        let sets = &mut self.periods[period].sets;
        sets.push(set);
        sets.len() - 1
    }

    /// Insert keeping the set ordered by ascending bandwidth.
    pub fn add_representation(
        &mut self,
        period: usize,
        set: usize,
        id: impl Into<String>,
        bandwidth: u64,
    ) -> RepresentationKey {
        let id = id.into();
        let parent = self.periods[period].sets[set].node;
        let node = self.tree.add_node(parent, NodeType::SegmentInformation);
        self.tree.set_context(
            node,
            TemplateContext {
                representation_id: Some(id.clone()),
                bandwidth: Some(bandwidth),
            },
        );
        let rep = Representation {
            node,
            id,
            bandwidth,
            width: None,
            height: None,
            codecs: None,
            format: StreamFormat::Unknown,
            base_url: None,
            encryption: None,
            index_segment: None,
            failures: 0,
        };
        let reps = &mut self.periods[period].sets[set].representations;
        let at = reps
            .iter()
            .position(|r| r.bandwidth > bandwidth)
            .unwrap_or(reps.len());
        reps.insert(at, rep);
        RepresentationKey {
            period,
            set,
            representation: at,
        }
    }

    pub fn representation(&self, key: RepresentationKey) -> Option<&Representation> {
        self.periods
            .get(key.period)?
            .sets
            .get(key.set)?
            .representations
            .get(key.representation)
    }

    pub fn representation_mut(&mut self, key: RepresentationKey) -> Option<&mut Representation> {
        self.periods
            .get_mut(key.period)?
            .sets
            .get_mut(key.set)?
            .representations
            .get_mut(key.representation)
    }

    pub fn adaptation_set(&self, key: RepresentationKey) -> Option<&AdaptationSet> {
        self.periods.get(key.period)?.sets.get(key.set)
    }

    /// Resolve a possibly-relative segment URL against the representation's
    /// base URL chain (representation, set, period, playlist).
    pub fn resolve_url(&self, key: RepresentationKey, target: &str) -> HibikiResult<Url> {
        if let Ok(absolute) = Url::parse(target) {
            return Ok(absolute);
        }
        let base = self
            .representation(key)
            .and_then(|r| r.base_url.as_ref())
            .or_else(|| self.adaptation_set(key).and_then(|s| s.base_url.as_ref()))
            .or_else(|| {
                self.periods
                    .get(key.period)
                    .and_then(|p| p.base_url.as_ref())
            })
            .or(self.props.url.as_ref())
            .ok_or_else(|| {
                HibikiError::PlaylistError(format!("no base url to resolve '{target}'"))
            })?;
        Ok(base.join(target)?)
    }

    /// Effective encryption descriptor for a representation: its own wins,
    /// then the adaptation set's, then the period's.
    pub fn encryption(&self, key: RepresentationKey) -> Option<&EncryptionDescriptor> {
        self.representation(key)
            .and_then(|r| r.encryption.as_ref())
            .or_else(|| {
                self.adaptation_set(key)
                    .and_then(|s| s.encryption.as_ref())
            })
            .filter(|enc| enc.is_encrypted())
    }

    fn profile(&self, node: NodeId) -> Option<ProfileRef> {
        if let Some(id) = self.tree.inherit_segment_template(node) {
            return Some(ProfileRef::Template(id));
        }
        if let Some(id) = self.tree.inherit_segment_list(node) {
            return Some(ProfileRef::List(id));
        }
        self.tree.inherit_segment_base(node).map(ProfileRef::Base)
    }

    pub fn media_segment(&self, key: RepresentationKey, number: u64) -> Option<Segment> {
        let node = self.representation(key)?.node;
        match self.profile(node)? {
            ProfileRef::Template(id) => self.tree.template_media_segment(id, number),
            ProfileRef::List(id) => self.tree.list_media_segment(id, number),
            ProfileRef::Base(id) => self.tree.base_media_segment(id, number),
        }
    }

    /// Segment at `number` or the next one available. The returned number
    /// is the segment actually found and the flag tells whether a gap was
    /// jumped over.
    pub fn next_media_segment(
        &self,
        key: RepresentationKey,
        number: u64,
    ) -> Option<(Segment, u64, bool)> {
        let node = self.representation(key)?.node;
        match self.profile(node)? {
            ProfileRef::Template(id) => {
                let start = self.tree.template_start_segment_number(id);
                let effective = number.max(start);
                self.tree
                    .template_media_segment(id, effective)
                    .map(|seg| (seg, effective, effective != number))
            }
            ProfileRef::List(id) => self.tree.list_next_media_segment(id, number),
            ProfileRef::Base(id) => self.tree.base_next_media_segment(id, number),
        }
    }

    pub fn init_segment(&self, key: RepresentationKey) -> Option<InitSegment> {
        let node = self.representation(key)?.node;
        match self.profile(node)? {
            ProfileRef::Template(id) => self.tree.template_init_segment(id),
            // explicit profiles carry their init segment on the manifest
            ProfileRef::List(_) | ProfileRef::Base(_) => None,
        }
    }

    /// Index segment that still has to be fetched and parsed before the
    /// representation's single segment becomes addressable.
    pub fn pending_index(&self, key: RepresentationKey) -> Option<IndexSegment> {
        let rep = self.representation(key)?;
        let index = rep.index_segment.clone()?;
        match self.profile(rep.node)? {
            ProfileRef::Base(id) => match self.tree.payload(id) {
                Payload::Base(base) if base.subsegments().is_empty() => Some(index),
                _ => None,
            },
            _ => None,
        }
    }

    /// Split the representation's single segment at the given index entries.
    pub fn split_using_index(&mut self, key: RepresentationKey, points: &[SplitPoint]) {
        let Some(node) = self.representation(key).map(|r| r.node) else {
            return;
        };
        let Some(ProfileRef::Base(id)) = self.profile(node) else {
            return;
        };
        if let Payload::Base(base) = self.tree.payload_mut(id) {
            base.split_using_index(points);
        }
    }

    pub fn start_segment_number(&self, key: RepresentationKey) -> u64 {
        let Some(rep) = self.representation(key) else {
            return 0;
        };
        match self.profile(rep.node) {
            Some(ProfileRef::Template(id)) => self.tree.template_start_segment_number(id),
            Some(ProfileRef::List(id)) => {
                self.tree.list_start_segment_number(id).unwrap_or(0)
            }
            Some(ProfileRef::Base(_)) | None => 0,
        }
    }

    pub fn segment_number_by_time(&self, key: RepresentationKey, time: Tick) -> Option<u64> {
        let node = self.representation(key)?.node;
        match self.profile(node)? {
            ProfileRef::Template(id) => self.tree.template_segment_number_by_time(id, time),
            ProfileRef::List(id) => self.tree.list_segment_number_by_time(id, time),
            ProfileRef::Base(id) => self.tree.base_segment_number_by_time(id, time),
        }
    }

    pub fn playback_time_duration(
        &self,
        key: RepresentationKey,
        number: u64,
    ) -> Option<(Tick, Tick)> {
        let node = self.representation(key)?.node;
        match self.profile(node)? {
            ProfileRef::Template(id) => self.tree.template_playback_time_duration(id, number),
            ProfileRef::List(id) => self.tree.list_playback_time_duration(id, number),
            ProfileRef::Base(id) => self.tree.base_playback_time_duration(id, number),
        }
    }

    /// Buffered-manifest depth past `number`: how much media is still
    /// addressable without a refresh.
    pub fn min_ahead_time(&self, key: RepresentationKey, number: u64) -> Tick {
        let Some(rep) = self.representation(key) else {
            return 0;
        };
        match self.profile(rep.node) {
            Some(ProfileRef::Template(id)) => self.tree.template_min_ahead_time(id, number),
            Some(ProfileRef::List(id)) => self.tree.list_min_ahead_time(id, number),
            Some(ProfileRef::Base(id)) => self.tree.base_min_ahead_time(id, number),
            None => 0,
        }
    }

    /// Highest segment number currently addressable, when the profile
    /// enumerates its media. Duration-based templates are unbounded and
    /// answer through [`Playlist::live_template_number`] instead.
    pub fn last_segment_number(&self, key: RepresentationKey) -> Option<u64> {
        let node = self.representation(key)?.node;
        match self.profile(node)? {
            ProfileRef::Template(id) => self.tree.timeline(id)?.max_element_number(),
            ProfileRef::List(id) => match self.tree.payload(id) {
                Payload::List(list) => list.segments().last().map(|s| s.sequence),
                _ => None,
            },
            ProfileRef::Base(id) => match self.tree.payload(id) {
                Payload::Base(base) => {
                    let n = base.subsegments().len() as u64;
                    (n > 0).then(|| n - 1)
                }
                _ => None,
            },
        }
    }

    /// Live edge segment number for duration-based templates.
    pub fn live_template_number(&self, key: RepresentationKey, now: Tick) -> Option<u64> {
        let node = self.representation(key)?.node;
        let availability_start = self.props.availability_start_time?;
        match self.profile(node)? {
            ProfileRef::Template(id) => {
                self.tree.template_live_number(id, now, availability_start)
            }
            _ => None,
        }
    }

    /// Drop addressing state for segments below `below` on every
    /// representation. Consumed sequence numbers never come back.
    pub fn prune_by_sequence(&mut self, key: RepresentationKey, below: u64) {
        let Some(node) = self.representation(key).map(|r| r.node) else {
            return;
        };
        match self.profile(node) {
            Some(ProfileRef::Template(id)) => self.tree.template_prune_by_sequence(id, below),
            Some(ProfileRef::List(id)) => self.tree.list_prune_by_sequence(id, below),
            Some(ProfileRef::Base(_)) | None => {}
        }
    }

    pub fn prune_by_time(&mut self, time: Tick) {
        for key in self.representation_keys() {
            let Some(node) = self.representation(key).map(|r| r.node) else {
                continue;
            };
            match self.profile(node) {
                Some(ProfileRef::Template(id)) => self.tree.template_prune_by_time(id, time),
                Some(ProfileRef::List(id)) => self.tree.list_prune_by_time(id, time),
                Some(ProfileRef::Base(_)) | None => {}
            }
        }
    }

    pub fn representation_keys(&self) -> Vec<RepresentationKey> {
        let mut keys = Vec::new();
        for (pi, period) in self.periods.iter().enumerate() {
            for (si, set) in period.sets.iter().enumerate() {
                for ri in 0..set.representations.len() {
                    keys.push(RepresentationKey {
                        period: pi,
                        set: si,
                        representation: ri,
                    });
                }
            }
        }
        keys
    }

    /// Merge a freshly fetched manifest into this one.
    ///
    /// Presentation properties are taken from the update; per-representation
    /// addressing state is merged so that sequence numbering and media times
    /// stay continuous across the refresh (lists splice, timelines extend,
    /// templates swap wholesale since they carry no per-segment state).
    pub fn update_with(&mut self, mut updated: Playlist) {
        // a playlist that stopped updating stays stopped
        let still_updating = self.props.needs_updates;
        self.props = updated.props.clone();
        self.props.needs_updates = still_updating && updated.props.needs_updates;

        for key in self.representation_keys() {
            let Some(node) = self.representation(key).map(|r| r.node) else {
                continue;
            };
            let Some(updated_node) = updated
                .find_representation(key)
                .map(|r| r.node)
            else {
                continue;
            };

            match (self.profile(node), updated.profile(updated_node)) {
                (Some(ProfileRef::List(ours)), Some(ProfileRef::List(theirs))) => {
                    if let Payload::List(list) =
                        std::mem::take(updated.tree.payload_mut(theirs))
                    {
                        self.tree.list_update_with(ours, list);
                    }
                }
                (Some(ProfileRef::Template(ours)), Some(ProfileRef::Template(theirs))) => {
                    self.merge_template(ours, &mut updated.tree, theirs);
                }
                _ => {}
            }
        }
        self.update_failures = 0;
    }

    fn find_representation(&self, key: RepresentationKey) -> Option<&Representation> {
        let period = self.periods.get(key.period)?;
        let set = period.sets.get(key.set)?;
        set.representations.get(key.representation)
    }

    fn merge_template(&mut self, ours: NodeId, theirs_tree: &mut AttrsTree, theirs: NodeId) {
        // scalar attributes follow the update
        for copy in [
            theirs_tree.inherit(theirs, attrs::AttrType::Timescale).cloned(),
            theirs_tree.inherit(theirs, attrs::AttrType::Duration).cloned(),
            theirs_tree
                .inherit(theirs, attrs::AttrType::StartNumber)
                .cloned(),
        ] {
            match copy {
                Some(AttrValue::Timescale(ts)) => self.tree.set_timescale(ours, ts),
                Some(AttrValue::Duration(d)) => self.tree.set_duration(ours, d),
                Some(AttrValue::StartNumber(n)) => self.tree.set_start_number(ours, n),
                _ => {}
            }
        }
        if let Payload::Template(template) = std::mem::take(theirs_tree.payload_mut(theirs)) {
            if let Payload::Template(ours_payload) = self.tree.payload_mut(ours) {
                *ours_payload = template;
            }
        }
        // timelines extend rather than replace
        let ours_timeline = self.tree.inherit_segment_timeline(ours);
        let theirs_timeline = theirs_tree.inherit_segment_timeline(theirs);
        match (ours_timeline, theirs_timeline) {
            (Some(o), Some(t)) => {
                if let Payload::Timeline(timeline) = std::mem::take(theirs_tree.payload_mut(t)) {
                    if let Payload::Timeline(ours_tl) = self.tree.payload_mut(o) {
                        ours_tl.update_with(&timeline);
                    }
                }
            }
            (None, Some(t)) => {
                if let Payload::Timeline(timeline) = std::mem::take(theirs_tree.payload_mut(t)) {
                    self.tree.attach_payload(ours, Payload::Timeline(timeline));
                }
            }
            _ => {}
        }
    }

    /// Record a failed refresh. After [`MAX_UPDATE_FAILURES`] consecutive
    /// failures the playlist stops asking for updates.
    pub fn mark_update_failure(&mut self) -> HibikiResult<()> {
        self.update_failures += 1;
        if self.update_failures >= MAX_UPDATE_FAILURES {
            self.props.needs_updates = false;
            return Err(HibikiError::CanNoLongerUpdate);
        }
        Ok(())
    }

    pub fn needs_updates(&self) -> bool {
        self.props.is_live && self.props.needs_updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ticks_from_seconds, Timescale};

    fn playlist_with_list(range: std::ops::Range<u64>) -> (Playlist, RepresentationKey) {
        let mut playlist = Playlist::new(PlaylistProps {
            is_live: true,
            needs_updates: true,
            ..Default::default()
        });
        let period = playlist.add_period(Period::default());
        let set = playlist.add_adaptation_set(period, AdaptationSet::default());
        let key = playlist.add_representation(period, set, "a1", 800_000);
        let node = playlist.representation(key).unwrap().node;
        playlist.tree_mut().set_timescale(node, Timescale::new(1));
        playlist.tree_mut().set_duration(node, 2);
        let mut list = SegmentList::new(true);
        for i in range {
            list.add_segment(
                Segment::new(i, i as i64 * 2, 2).with_url(format!("seg{i}.ts")),
            );
        }
        playlist
            .tree_mut()
            .attach_payload(node, Payload::List(list));
        (playlist, key)
    }

    #[test]
    fn test_representations_sorted_by_bandwidth() {
        let mut playlist = Playlist::new(PlaylistProps::default());
        let period = playlist.add_period(Period::default());
        let set = playlist.add_adaptation_set(period, AdaptationSet::default());
        playlist.add_representation(period, set, "hi", 3_000_000);
        playlist.add_representation(period, set, "lo", 500_000);
        playlist.add_representation(period, set, "mid", 1_200_000);

        let bands: Vec<u64> = playlist.periods()[0].sets[0]
            .representations()
            .iter()
            .map(|r| r.bandwidth)
            .collect();
        assert_eq!(bands, vec![500_000, 1_200_000, 3_000_000]);
        assert_eq!(playlist.periods()[0].sets[0].best().unwrap().id, "hi");
    }

    #[test]
    fn test_unified_addressing_over_list() {
        let (playlist, key) = playlist_with_list(0..10);
        let seg = playlist.media_segment(key, 4).unwrap();
        assert_eq!(seg.url.as_deref(), Some("seg4.ts"));
        assert_eq!(
            playlist.segment_number_by_time(key, ticks_from_seconds(9)),
            Some(4)
        );
        assert_eq!(playlist.min_ahead_time(key, 8), ticks_from_seconds(2));
        assert_eq!(playlist.start_segment_number(key), 0);
    }

    #[test]
    fn test_update_never_regresses_sequences() {
        let (mut playlist, key) = playlist_with_list(0..8);
        let (updated, _) = playlist_with_list(6..13);
        playlist.update_with(updated);

        // window slid forward, nothing re-numbered below the update start
        assert!(playlist.media_segment(key, 5).is_none());
        assert_eq!(playlist.start_segment_number(key), 6);
        assert!(playlist.media_segment(key, 12).is_some());
        let (s1, _) = playlist.playback_time_duration(key, 11).unwrap();
        let (s2, _) = playlist.playback_time_duration(key, 12).unwrap();
        assert!(s1 < s2);
    }

    #[test]
    fn test_update_failure_budget() {
        let (mut playlist, _) = playlist_with_list(0..4);
        assert!(playlist.needs_updates());
        assert!(playlist.mark_update_failure().is_ok());
        assert!(playlist.mark_update_failure().is_ok());
        assert!(matches!(
            playlist.mark_update_failure(),
            Err(HibikiError::CanNoLongerUpdate)
        ));
        assert!(!playlist.needs_updates());
    }

    #[test]
    fn test_segment_failure_budget_resets_on_success() {
        let (mut playlist, key) = playlist_with_list(0..4);
        let rep = playlist.representation_mut(key).unwrap();
        assert!(!rep.record_failure());
        assert!(!rep.record_failure());
        rep.record_success();
        assert!(!rep.record_failure());
        assert!(!rep.record_failure());
        assert!(rep.record_failure());
        assert!(!rep.is_usable());
    }

    #[test]
    fn test_resolve_url_chain() {
        let (mut playlist, key) = playlist_with_list(0..2);
        playlist.props.url = Some(Url::parse("https://cdn.example.com/live/index.mpd").unwrap());
        let url = playlist.resolve_url(key, "seg1.ts").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/live/seg1.ts");

        playlist.representation_mut(key).unwrap().base_url =
            Some(Url::parse("https://edge.example.com/a1/").unwrap());
        let url = playlist.resolve_url(key, "seg1.ts").unwrap();
        assert_eq!(url.as_str(), "https://edge.example.com/a1/seg1.ts");

        let url = playlist
            .resolve_url(key, "https://other.example.com/x.ts")
            .unwrap();
        assert_eq!(url.as_str(), "https://other.example.com/x.ts");
    }

    #[test]
    fn test_stream_format_from_mime() {
        assert_eq!(StreamFormat::from_mime_type("video/mp4"), StreamFormat::Fmp4);
        assert_eq!(
            StreamFormat::from_mime_type("video/mp2t"),
            StreamFormat::MpegTs
        );
        assert_eq!(
            StreamFormat::from_mime_type("audio/aac"),
            StreamFormat::PackedAudio
        );
        assert_eq!(
            StreamFormat::from_mime_type("garbage"),
            StreamFormat::Unknown
        );
    }
}
