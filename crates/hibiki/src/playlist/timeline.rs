use crate::time::ScaledTime;

/// One `(start, duration, repeat)` run of equally sized segments.
///
/// `repeat` counts additional segments, so a run describes `repeat + 1`
/// consecutive segments of `duration` units starting at `start`. `number`
/// is the sequence number of the run's first segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineElement {
    pub start: ScaledTime,
    pub duration: ScaledTime,
    pub repeat: u64,
    pub number: u64,
}

impl TimelineElement {
    fn contains(&self, time: ScaledTime) -> bool {
        time >= self.start && time < self.end()
    }

    fn end(&self) -> ScaledTime {
        self.start + self.duration * (self.repeat as i64 + 1)
    }

    fn last_number(&self) -> u64 {
        self.number + self.repeat
    }
}

/// Explicit segment-boundary list for one representation.
///
/// Elements are kept time-ordered and non-overlapping; numbering is
/// continuous across elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTimeline {
    elements: Vec<TimelineElement>,
    total_length: ScaledTime,
}

impl SegmentTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a run. When `start` is `None` the run continues at the end of
    /// the previous one (the usual manifest shorthand).
    pub fn add_element(&mut self, start: Option<ScaledTime>, duration: ScaledTime, repeat: u64) {
        // zero-length runs would poison every duration division below
        if duration <= 0 {
            return;
        }
        let (start, number) = match self.elements.last() {
            Some(prev) => (
                start.unwrap_or_else(|| prev.end()),
                prev.last_number() + 1,
            ),
            None => (start.unwrap_or(0), 0),
        };
        self.total_length += duration * (repeat as i64 + 1);
        self.elements.push(TimelineElement {
            start,
            duration,
            repeat,
            number,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[TimelineElement] {
        &self.elements
    }

    pub fn total_length(&self) -> ScaledTime {
        self.total_length
    }

    pub fn min_element_number(&self) -> Option<u64> {
        self.elements.first().map(|e| e.number)
    }

    pub fn max_element_number(&self) -> Option<u64> {
        self.elements.last().map(|e| e.last_number())
    }

    /// Segment number covering `time`.
    ///
    /// Intervals are half-open `[t, t + d)`; at an exact boundary the later
    /// segment wins. Times before the window clamp to the first number,
    /// beyond it to the last.
    pub fn element_number_by_scaled_time(&self, time: ScaledTime) -> Option<u64> {
        let first = self.elements.first()?;
        if time < first.start {
            return Some(first.number);
        }
        for el in &self.elements {
            if el.contains(time) {
                return Some(el.number + ((time - el.start) / el.duration) as u64);
            }
        }
        self.max_element_number()
    }

    /// `(start, duration)` of segment `number` in scaled time.
    pub fn scaled_time_duration_by_element_number(
        &self,
        number: u64,
    ) -> Option<(ScaledTime, ScaledTime)> {
        for el in &self.elements {
            if number >= el.number && number <= el.last_number() {
                let start = el.start + el.duration * (number - el.number) as i64;
                return Some((start, el.duration));
            }
        }
        None
    }

    pub fn scaled_time_by_element_number(&self, number: u64) -> Option<ScaledTime> {
        self.scaled_time_duration_by_element_number(number)
            .map(|(t, _)| t)
    }

    /// Position of segment `number` counted from the window start, for
    /// indexing a companion segment array.
    pub fn element_index_by_sequence(&self, number: u64) -> Option<usize> {
        let mut index = 0usize;
        for el in &self.elements {
            if number >= el.number && number <= el.last_number() {
                return Some(index + (number - el.number) as usize);
            }
            index += el.repeat as usize + 1;
        }
        None
    }

    /// Total remaining scaled duration strictly after segment `number`.
    pub fn min_ahead_scaled_time(&self, number: u64) -> ScaledTime {
        let mut ahead = 0;
        for el in &self.elements {
            if el.last_number() <= number {
                continue;
            }
            let from = if number < el.number {
                el.number
            } else {
                number + 1
            };
            ahead += el.duration * (el.last_number() - from + 1) as i64;
        }
        ahead
    }

    /// Drop whole segments numbered below `below`. Returns how many were
    /// removed.
    pub fn prune_by_sequence_number(&mut self, below: u64) -> usize {
        let mut removed = 0usize;
        while let Some(first) = self.elements.first_mut() {
            if first.last_number() < below {
                removed += first.repeat as usize + 1;
                self.total_length -= first.duration * (first.repeat as i64 + 1);
                self.elements.remove(0);
            } else if first.number < below {
                let cut = below - first.number;
                removed += cut as usize;
                first.start += first.duration * cut as i64;
                first.number += cut;
                first.repeat -= cut;
                self.total_length -= first.duration * cut as i64;
                break;
            } else {
                break;
            }
        }
        removed
    }

    pub fn prune_by_scaled_time(&mut self, time: ScaledTime) -> usize {
        match self.element_number_by_scaled_time(time) {
            Some(number) => self.prune_by_sequence_number(number),
            None => 0,
        }
    }

    /// Merge a refreshed timeline: append only the runs (or run tails) that
    /// extend past our current end, renumbering them to stay continuous.
    pub fn update_with(&mut self, other: &SegmentTimeline) {
        if self.elements.is_empty() {
            *self = other.clone();
            return;
        }
        let end = self.elements.last().map(|e| e.end()).unwrap_or(0);
        for el in &other.elements {
            if el.end() <= end {
                continue;
            }
            if el.start >= end {
                self.add_element(Some(el.start), el.duration, el.repeat);
            } else {
                // partially known run, keep only the new tail
                let known = ((end - el.start) / el.duration) as u64;
                let start = el.start + el.duration * known as i64;
                self.add_element(Some(start), el.duration, el.repeat - known);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_timeline() -> SegmentTimeline {
        // 10 equal 100-unit segments
        let mut tl = SegmentTimeline::new();
        tl.add_element(Some(0), 100, 0);
        tl.add_element(Some(100), 100, 8);
        tl
    }

    #[test]
    fn test_number_by_scaled_time() {
        let tl = sample_timeline();
        assert_eq!(tl.element_number_by_scaled_time(899), Some(8));
        assert_eq!(tl.element_number_by_scaled_time(950), Some(9));
        assert_eq!(tl.element_number_by_scaled_time(0), Some(0));
        // boundary: the later segment wins
        assert_eq!(tl.element_number_by_scaled_time(100), Some(1));
        assert_eq!(tl.element_number_by_scaled_time(99), Some(0));
    }

    #[test]
    fn test_number_time_inverse() {
        let tl = sample_timeline();
        for number in 0..10 {
            let (start, duration) = tl.scaled_time_duration_by_element_number(number).unwrap();
            assert_eq!(duration, 100);
            assert_eq!(tl.element_number_by_scaled_time(start), Some(number));
            assert_eq!(
                tl.element_number_by_scaled_time(start + duration - 1),
                Some(number)
            );
        }
    }

    #[test]
    fn test_clamping_and_empty() {
        let tl = sample_timeline();
        assert_eq!(tl.element_number_by_scaled_time(-50), Some(0));
        assert_eq!(tl.element_number_by_scaled_time(5000), Some(9));
        assert_eq!(SegmentTimeline::new().element_number_by_scaled_time(0), None);
    }

    #[test]
    fn test_min_ahead() {
        let tl = sample_timeline();
        assert_eq!(tl.min_ahead_scaled_time(7), 200);
        assert_eq!(tl.min_ahead_scaled_time(9), 0);
        assert_eq!(tl.min_ahead_scaled_time(0), 900);
    }

    #[test]
    fn test_prune_by_sequence() {
        let mut tl = sample_timeline();
        assert_eq!(tl.prune_by_sequence_number(3), 3);
        assert_eq!(tl.min_element_number(), Some(3));
        assert_eq!(tl.total_length(), 700);
        assert_eq!(tl.scaled_time_by_element_number(3), Some(300));
        // numbers below the window are gone
        assert_eq!(tl.scaled_time_by_element_number(2), None);
    }

    #[test]
    fn test_update_with_appends_new_tail() {
        let mut tl = sample_timeline();
        let mut update = SegmentTimeline::new();
        // overlaps the known window and extends it by 5 segments
        update.add_element(Some(800), 100, 6);
        tl.update_with(&update);
        assert_eq!(tl.max_element_number(), Some(14));
        assert_eq!(tl.total_length(), 1500);
        // numbering stays monotone and times line up
        assert_eq!(tl.scaled_time_by_element_number(10), Some(1000));
        assert_eq!(tl.element_number_by_scaled_time(1499), Some(14));
    }

    #[test]
    fn test_zero_duration_runs_are_dropped() {
        let mut tl = sample_timeline();
        tl.add_element(Some(1000), 0, 4);
        assert_eq!(tl.max_element_number(), Some(9));
        assert_eq!(tl.total_length(), 1000);
        // lookups keep working instead of dividing by zero
        assert_eq!(tl.element_number_by_scaled_time(950), Some(9));

        let mut empty = SegmentTimeline::new();
        empty.add_element(None, 0, 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_element_index_by_sequence() {
        let mut tl = sample_timeline();
        assert_eq!(tl.element_index_by_sequence(0), Some(0));
        assert_eq!(tl.element_index_by_sequence(9), Some(9));
        tl.prune_by_sequence_number(4);
        assert_eq!(tl.element_index_by_sequence(4), Some(0));
        assert_eq!(tl.element_index_by_sequence(9), Some(5));
    }
}
