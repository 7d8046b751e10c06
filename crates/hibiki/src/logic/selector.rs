use crate::playlist::AdaptationSet;

/// Bitrate/resolution-constrained picker over an adaptation set.
///
/// Representations are stored sorted by ascending bandwidth, so "lowest"
/// is the front and upgrades walk toward the back. A representation whose
/// declared resolution exceeds the caps is never upgraded into; when
/// nothing fits the caps the lowest bandwidth wins regardless. A
/// representation that exhausted its failure budget is skipped entirely.
pub struct RepresentationSelector {
    max_width: u32,
    max_height: u32,
}

impl RepresentationSelector {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    fn fits(&self, set: &AdaptationSet, index: usize) -> bool {
        let rep = &set.representations()[index];
        rep.width.unwrap_or(0) <= self.max_width && rep.height.unwrap_or(0) <= self.max_height
    }

    fn eligible(&self, set: &AdaptationSet, index: usize) -> bool {
        set.representations()[index].is_usable() && self.fits(set, index)
    }

    pub fn lowest(&self, set: &AdaptationSet) -> Option<usize> {
        set.representations().iter().position(|r| r.is_usable())
    }

    pub fn highest(&self, set: &AdaptationSet) -> Option<usize> {
        (0..set.representations().len())
            .rev()
            .find(|&i| self.eligible(set, i))
            .or_else(|| self.lowest(set))
    }

    /// Next representation up from `current`, staying within the
    /// resolution caps.
    pub fn higher(&self, set: &AdaptationSet, current: usize) -> usize {
        let next = current + 1;
        if next < set.representations().len() && self.eligible(set, next) {
            next
        } else {
            current
        }
    }

    pub fn lower(&self, set: &AdaptationSet, current: usize) -> usize {
        set.representations()[..current]
            .iter()
            .rposition(|r| r.is_usable())
            .unwrap_or(current)
    }

    /// Highest representation whose bandwidth stays under `max_bitrate`,
    /// falling back to the lowest when nothing qualifies.
    pub fn select(&self, set: &AdaptationSet, max_bitrate: u64) -> Option<usize> {
        self.select_range(set, 0, max_bitrate)
    }

    pub fn select_range(
        &self,
        set: &AdaptationSet,
        min_bitrate: u64,
        max_bitrate: u64,
    ) -> Option<usize> {
        let mut candidate = None;
        let mut floor = min_bitrate;
        for (i, rep) in set.representations().iter().enumerate() {
            if !self.eligible(set, i) {
                continue;
            }
            if rep.bandwidth < max_bitrate && rep.bandwidth > floor {
                candidate = Some(i);
                floor = rep.bandwidth;
            }
        }
        candidate.or_else(|| self.lowest(set))
    }
}

impl Default for RepresentationSelector {
    fn default() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }
}
