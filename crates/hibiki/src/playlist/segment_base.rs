use crate::playlist::attrs::{AttrsTree, NodeId};
use crate::playlist::segment::{find_segment_number_by_scaled_time, ByteRange, Segment, SplitPoint};
use crate::time::Tick;

/// Single-segment addressing: the whole representation is one resource,
/// optionally split into byte-addressed sub-segments by an index.
///
/// Sub-segment numbering is positional, starting at 0.
#[derive(Debug, Clone, Default)]
pub struct SegmentBase {
    pub url: Option<String>,
    pub index_range: Option<ByteRange>,
    subsegments: Vec<Segment>,
}

impl SegmentBase {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn subsegments(&self) -> &[Segment] {
        &self.subsegments
    }

    /// Split into sub-segments at the given index entries. Each split point
    /// owns the bytes up to the next one's offset (the last is open-ended).
    pub fn split_using_index(&mut self, points: &[SplitPoint]) {
        self.subsegments.clear();
        for (i, point) in points.iter().enumerate() {
            let length = points.get(i + 1).map(|next| next.offset - point.offset);
            let mut seg = Segment::new(i as u64, point.time, point.duration)
                .with_byte_range(ByteRange::new(point.offset, length));
            seg.url = self.url.clone();
            self.subsegments.push(seg);
        }
    }
}

impl AttrsTree {
    pub(crate) fn base_media_segment(&self, node: NodeId, number: u64) -> Option<Segment> {
        let base = self.base_payload(node)?;
        base.subsegments.get(number as usize).cloned()
    }

    pub(crate) fn base_next_media_segment(
        &self,
        node: NodeId,
        number: u64,
    ) -> Option<(Segment, u64, bool)> {
        self.base_media_segment(node, number)
            .map(|seg| (seg, number, false))
    }

    pub(crate) fn base_segment_number_by_time(&self, node: NodeId, time: Tick) -> Option<u64> {
        let timescale = self.inherit_timescale(node);
        if !timescale.is_valid() {
            return None;
        }
        let base = self.base_payload(node)?;
        find_segment_number_by_scaled_time(&base.subsegments, timescale.to_scaled(time))
    }

    pub(crate) fn base_playback_time_duration(
        &self,
        node: NodeId,
        number: u64,
    ) -> Option<(Tick, Tick)> {
        let timescale = self.inherit_timescale(node);
        let base = self.base_payload(node)?;
        let seg = base.subsegments.get(number as usize)?;
        Some((
            timescale.to_time(seg.start_time),
            timescale.to_time(seg.duration),
        ))
    }

    /// Remaining media time strictly after sub-segment `number`.
    pub(crate) fn base_min_ahead_time(&self, node: NodeId, number: u64) -> Tick {
        let timescale = self.inherit_timescale(node);
        if !timescale.is_valid() {
            return 0;
        }
        let Some(base) = self.base_payload(node) else {
            return 0;
        };
        if base.subsegments.is_empty() || number as usize >= base.subsegments.len() - 1 {
            return 0;
        }
        let ahead: i64 = base.subsegments[number as usize + 1..]
            .iter()
            .map(|seg| seg.duration)
            .sum();
        timescale.to_time(ahead)
    }

    fn base_payload(&self, node: NodeId) -> Option<&SegmentBase> {
        match self.payload(node) {
            super::attrs::Payload::Base(base) => Some(base),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::attrs::{NodeType, Payload};
    use crate::time::Timescale;

    fn split_base(tree: &mut AttrsTree) -> NodeId {
        let rep = tree.add_node(None, NodeType::SegmentInformation);
        tree.set_timescale(rep, Timescale::new(100));
        let mut base = SegmentBase::new("https://example.com/media.mp4");
        let points: Vec<SplitPoint> = (0..10)
            .map(|i| SplitPoint {
                offset: 123 + i as u64 * 100,
                time: i * 100,
                duration: 100,
            })
            .collect();
        base.split_using_index(&points);
        tree.attach_payload(rep, Payload::Base(base))
    }

    #[test]
    fn test_media_segment_offsets() {
        let mut tree = AttrsTree::new();
        let node = split_base(&mut tree);

        let seg = tree.base_media_segment(node, 7).unwrap();
        assert_eq!(seg.offset(), 823);
        assert_eq!(seg.byte_range.as_ref().unwrap().length, Some(100));
        // last sub-segment is open-ended
        let last = tree.base_media_segment(node, 9).unwrap();
        assert_eq!(last.byte_range.as_ref().unwrap().length, None);
        assert!(tree.base_media_segment(node, 10).is_none());
    }

    #[test]
    fn test_min_ahead_time() {
        let mut tree = AttrsTree::new();
        let node = split_base(&mut tree);
        let timescale = Timescale::new(100);
        assert_eq!(tree.base_min_ahead_time(node, 7), timescale.to_time(200));
        assert_eq!(tree.base_min_ahead_time(node, 9), 0);
    }

    #[test]
    fn test_segment_number_by_time() {
        let mut tree = AttrsTree::new();
        let node = split_base(&mut tree);
        let timescale = Timescale::new(100);
        // scaled 350 = segment 3
        assert_eq!(
            tree.base_segment_number_by_time(node, timescale.to_time(350)),
            Some(3)
        );
        let (time, dur) = tree.base_playback_time_duration(node, 3).unwrap();
        assert_eq!(time, timescale.to_time(300));
        assert_eq!(dur, timescale.to_time(100));
    }
}
