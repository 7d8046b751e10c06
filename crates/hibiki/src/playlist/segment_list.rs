use crate::playlist::attrs::{AttrsTree, NodeId, Payload};
use crate::playlist::segment::{find_segment_number_by_scaled_time, Segment};
use crate::time::{ScaledTime, Tick};

/// Explicit enumerated-segment addressing.
///
/// Live playlists refresh this list; how an update is merged depends on
/// whether segment media times are absolute (authoritative, replace) or
/// relative to the window (splice and restamp).
#[derive(Debug, Clone, Default)]
pub struct SegmentList {
    segments: Vec<Segment>,
    total_length: ScaledTime,
    relative_media_times: bool,
}

impl SegmentList {
    pub fn new(relative_media_times: bool) -> Self {
        Self {
            relative_media_times,
            ..Default::default()
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_relative_media_times(&self) -> bool {
        self.relative_media_times
    }

    pub fn total_length(&self) -> ScaledTime {
        self.total_length
    }

    pub fn add_segment(&mut self, segment: Segment) {
        self.total_length += segment.duration;
        self.segments.push(segment);
    }

    pub fn prune_by_sequence_number(&mut self, below: u64) {
        let keep_from = self
            .segments
            .iter()
            .position(|seg| seg.sequence >= below)
            .unwrap_or(self.segments.len());
        for seg in &self.segments[..keep_from] {
            self.total_length -= seg.duration;
        }
        self.segments.drain(..keep_from);
    }

    /// Merge a refreshed list.
    ///
    /// Absolute media times: the update is authoritative, replace wholesale.
    /// Relative times: keep what we have, splice in only segments with new
    /// sequence numbers, restamping their start times by accumulating onto
    /// the previous segment's end; a sequence gap inserts `default_duration`
    /// per missing segment. Finally prune to the update's window start so
    /// the list tracks the live window.
    pub fn update_with(&mut self, mut updated: SegmentList, default_duration: ScaledTime) {
        if updated.segments.is_empty() {
            return;
        }

        if !self.relative_media_times || self.segments.is_empty() {
            self.segments.clear();
            self.total_length = 0;
            for seg in updated.segments.drain(..) {
                self.add_segment(seg);
            }
            return;
        }

        let oldest = updated.segments[0].sequence;
        let Some(last) = self.segments.last() else {
            return;
        };
        let last_known = last.sequence;

        // filter out segments we already know
        updated.prune_by_sequence_number(last_known + 1);
        if updated.segments.is_empty() {
            return;
        }

        let mut prev = last.clone();
        for mut seg in updated.segments.drain(..) {
            seg.start_time = prev.start_time + prev.duration;
            if seg.sequence != prev.sequence + 1 {
                debug_assert!(prev.sequence < seg.sequence);
                let gap = seg.sequence - prev.sequence - 1;
                seg.start_time += default_duration * gap as i64;
            }
            prev = seg.clone();
            self.add_segment(seg);
        }

        // prune our tail of the previous window
        self.prune_by_sequence_number(oldest);
    }
}

impl AttrsTree {
    pub(crate) fn list_media_segment(&self, node: NodeId, number: u64) -> Option<Segment> {
        let list = self.list_payload(node)?;
        if let Some(timeline) = self.timeline(node) {
            let index = timeline.element_index_by_sequence(number)?;
            return list.segments.get(index).cloned();
        }
        list.segments
            .iter()
            .find(|seg| seg.sequence == number)
            .cloned()
    }

    /// Segment at `number` or the first one after it. Returns the segment,
    /// its actual number, and whether a gap was skipped.
    pub(crate) fn list_next_media_segment(
        &self,
        node: NodeId,
        number: u64,
    ) -> Option<(Segment, u64, bool)> {
        let list = self.list_payload(node)?;
        if let Some(timeline) = self.timeline(node) {
            let index = timeline.element_index_by_sequence(number)?;
            return list
                .segments
                .get(index)
                .cloned()
                .map(|seg| (seg, number, false));
        }
        list.segments
            .iter()
            .find(|seg| seg.sequence >= number)
            .cloned()
            .map(|seg| {
                let newpos = seg.sequence;
                (seg, newpos, newpos != number)
            })
    }

    pub(crate) fn list_start_segment_number(&self, node: NodeId) -> Option<u64> {
        if let Some(timeline) = self.timeline(node) {
            return timeline.min_element_number();
        }
        let list = self.list_payload(node)?;
        list.segments
            .first()
            .map(|seg| seg.sequence)
            .or_else(|| self.inherit_start_number(node))
    }

    pub(crate) fn list_segment_number_by_time(&self, node: NodeId, time: Tick) -> Option<u64> {
        if let Some(timeline) = self.timeline(node) {
            let timescale = self.inherit_timescale(self.inherit_segment_timeline(node)?);
            return timeline.element_number_by_scaled_time(timescale.to_scaled(time));
        }
        let timescale = self.inherit_timescale(node);
        if !timescale.is_valid() {
            return None;
        }
        let list = self.list_payload(node)?;
        find_segment_number_by_scaled_time(&list.segments, timescale.to_scaled(time))
    }

    pub(crate) fn list_playback_time_duration(
        &self,
        node: NodeId,
        number: u64,
    ) -> Option<(Tick, Tick)> {
        if let Some(timeline) = self.timeline(node) {
            let timescale = self.inherit_timescale(self.inherit_segment_timeline(node)?);
            let (start, duration) = timeline.scaled_time_duration_by_element_number(number)?;
            return Some((timescale.to_time(start), timescale.to_time(duration)));
        }

        let timescale = self.inherit_timescale(node);
        let default_duration = self.inherit_duration(node);
        let list = self.list_payload(node)?;
        let first = list.segments.first()?;
        if first.sequence > number {
            return None;
        }

        let mut start = first.start_time;
        let mut duration = 0;
        let mut found = false;
        for seg in &list.segments {
            duration = if seg.duration > 0 {
                seg.duration
            } else {
                default_duration
            };
            if seg.sequence == number {
                found = true;
                break;
            }
            start += duration;
        }
        if !found {
            return None;
        }
        Some((timescale.to_time(start), timescale.to_time(duration)))
    }

    pub(crate) fn list_min_ahead_time(&self, node: NodeId, number: u64) -> Tick {
        if let Some(timeline) = self.timeline(node) {
            if let Some(tl_node) = self.inherit_segment_timeline(node) {
                let timescale = self.inherit_timescale(tl_node);
                return timescale.to_time(timeline.min_ahead_scaled_time(number));
            }
        }
        let timescale = self.inherit_timescale(node);
        let Some(list) = self.list_payload(node) else {
            return 0;
        };
        let ahead: i64 = list
            .segments
            .iter()
            .filter(|seg| seg.sequence > number)
            .map(|seg| seg.duration)
            .sum();
        timescale.to_time(ahead)
    }

    pub(crate) fn list_prune_by_time(&mut self, node: NodeId, time: Tick) {
        let timescale = self.inherit_timescale(node);
        let Some(list) = self.list_payload(node) else {
            return;
        };
        if let Some(number) =
            find_segment_number_by_scaled_time(&list.segments, timescale.to_scaled(time))
        {
            self.list_prune_by_sequence(node, number);
        }
    }

    pub(crate) fn list_prune_by_sequence(&mut self, node: NodeId, below: u64) {
        if let Payload::List(list) = self.payload_mut(node) {
            list.prune_by_sequence_number(below);
        }
    }

    pub(crate) fn list_update_with(&mut self, node: NodeId, updated: SegmentList) {
        let default_duration = self.inherit_duration(node);
        if let Payload::List(list) = self.payload_mut(node) {
            list.update_with(updated, default_duration);
        }
    }

    fn list_payload(&self, node: NodeId) -> Option<&SegmentList> {
        match self.payload(node) {
            Payload::List(list) => Some(list),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::attrs::NodeType;
    use crate::time::Timescale;

    fn relative_list(range: std::ops::Range<u64>) -> SegmentList {
        let mut list = SegmentList::new(true);
        for i in range {
            list.add_segment(Segment::new(i, i as i64 * 100, 100));
        }
        list
    }

    #[test]
    fn test_relative_update_merges_without_duplicates() {
        let mut tree = AttrsTree::new();
        let rep = tree.add_node(None, NodeType::SegmentInformation);
        tree.set_duration(rep, 100);
        let node = tree.attach_payload(rep, Payload::List(relative_list(0..8)));

        // update window covers 6..=12
        tree.list_update_with(node, relative_list(6..13));

        let Payload::List(list) = tree.payload(node) else {
            unreachable!()
        };
        let sequences: Vec<u64> = list.segments().iter().map(|s| s.sequence).collect();
        // window pruned to the update's start (6), extended to 12, no dups
        assert_eq!(sequences, vec![6, 7, 8, 9, 10, 11, 12]);
        let times: Vec<i64> = list.segments().iter().map(|s| s.start_time).collect();
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1], "start times must strictly increase");
        }
    }

    #[test]
    fn test_relative_update_fills_sequence_gap() {
        let mut tree = AttrsTree::new();
        let rep = tree.add_node(None, NodeType::SegmentInformation);
        tree.set_duration(rep, 100);
        let node = tree.attach_payload(rep, Payload::List(relative_list(0..3)));

        // update skips sequences 3 and 4
        tree.list_update_with(node, relative_list(5..7));

        let Payload::List(list) = tree.payload(node) else {
            unreachable!()
        };
        let seg5 = list.segments().iter().find(|s| s.sequence == 5).unwrap();
        // 2 at 200..300, then a 2-segment hole: 5 restamps to 300 + 2*100
        assert_eq!(seg5.start_time, 500);
    }

    #[test]
    fn test_absolute_update_replaces() {
        let mut list = SegmentList::new(false);
        for i in 0..5 {
            list.add_segment(Segment::new(i, i as i64 * 100, 100));
        }
        list.update_with(relative_list(10..12), 100);
        let sequences: Vec<u64> = list.segments().iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![10, 11]);
        assert_eq!(list.total_length(), 200);
    }

    #[test]
    fn test_lookup_and_prune() {
        let mut tree = AttrsTree::new();
        let rep = tree.add_node(None, NodeType::SegmentInformation);
        tree.set_timescale(rep, Timescale::new(100));
        let node = tree.attach_payload(rep, Payload::List(relative_list(0..10)));

        assert_eq!(
            tree.list_media_segment(node, 4).map(|s| s.start_time),
            Some(400)
        );
        let timescale = Timescale::new(100);
        assert_eq!(
            tree.list_segment_number_by_time(node, timescale.to_time(450)),
            Some(4)
        );
        assert_eq!(
            tree.list_min_ahead_time(node, 7),
            timescale.to_time(200)
        );

        tree.list_prune_by_sequence(node, 5);
        assert!(tree.list_media_segment(node, 4).is_none());
        let (seg, newpos, gap) = tree.list_next_media_segment(node, 3).unwrap();
        assert_eq!((seg.sequence, newpos, gap), (5, 5, true));
    }
}
