//! Adaptation strategies.
//!
//! A strategy picks the representation for each upcoming download. All
//! callbacks are synchronous and cheap; the stream manager holds the logic
//! behind a mutex and calls in from both the scheduling loop and the
//! download-rate reporting path.

pub mod average;
pub mod buffering;
pub mod near_optimal;
pub mod rate;
pub mod selector;

use crate::options::{AdaptationStrategy, StreamingOptions};
use crate::playlist::AdaptationSet;
use crate::time::Tick;

pub use average::MovingAverage;
pub use buffering::BufferingLogic;
pub use selector::RepresentationSelector;

pub type StreamId = u64;

pub trait AdaptationLogic: Send {
    /// Representation index (into the set's bandwidth-ordered list) to use
    /// for the next download. `None` when the set is empty.
    fn next_representation(
        &mut self,
        id: StreamId,
        set: &AdaptationSet,
        current: Option<usize>,
    ) -> Option<usize>;

    /// Rate report for one completed chunk: `bytes` transferred over
    /// `elapsed` ticks, with `latency` ticks to the first byte.
    fn update_download_rate(
        &mut self,
        _id: StreamId,
        _bytes: usize,
        _elapsed: Tick,
        _latency: Tick,
    ) {
    }

    /// The stream committed to a new representation. Strategies tracking
    /// cross-stream bandwidth use this to move the reserved share.
    fn on_representation_switch(&mut self, _id: StreamId, _old_bps: Option<u64>, _new_bps: u64) {}

    /// Buffer state notification from the stream's buffering loop.
    fn on_buffering_update(&mut self, _id: StreamId, _min: Tick, _level: Tick, _target: Tick) {}
}

/// Pin the highest representation that fits the resolution caps.
pub struct AlwaysBestLogic {
    selector: RepresentationSelector,
}

impl AdaptationLogic for AlwaysBestLogic {
    fn next_representation(
        &mut self,
        _id: StreamId,
        set: &AdaptationSet,
        _current: Option<usize>,
    ) -> Option<usize> {
        self.selector.highest(set)
    }
}

/// Pin the lowest-bandwidth representation unconditionally.
pub struct AlwaysLowestLogic {
    selector: RepresentationSelector,
}

impl AdaptationLogic for AlwaysLowestLogic {
    fn next_representation(
        &mut self,
        _id: StreamId,
        set: &AdaptationSet,
        _current: Option<usize>,
    ) -> Option<usize> {
        self.selector.lowest(set)
    }
}

/// Pin the best representation under a user-chosen bitrate.
pub struct FixedRateLogic {
    bitrate: u64,
    selector: RepresentationSelector,
}

impl AdaptationLogic for FixedRateLogic {
    fn next_representation(
        &mut self,
        _id: StreamId,
        set: &AdaptationSet,
        _current: Option<usize>,
    ) -> Option<usize> {
        self.selector.select(set, self.bitrate)
    }
}

/// Build the logic the options ask for.
pub fn create_logic(options: &StreamingOptions) -> Box<dyn AdaptationLogic> {
    let selector = RepresentationSelector::new(options.max_width, options.max_height);
    match options.adaptation_strategy {
        AdaptationStrategy::AlwaysBest => Box::new(AlwaysBestLogic { selector }),
        AdaptationStrategy::AlwaysLowest => Box::new(AlwaysLowestLogic { selector }),
        AdaptationStrategy::FixedRate => Box::new(FixedRateLogic {
            bitrate: options.fixed_bitrate,
            selector,
        }),
        AdaptationStrategy::RateBased => Box::new(rate::RateBasedLogic::new(selector)),
        AdaptationStrategy::Predictive => Box::new(near_optimal::PredictiveLogic::new(selector)),
        AdaptationStrategy::NearOptimal => {
            Box::new(near_optimal::NearOptimalLogic::new(selector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{Period, Playlist, PlaylistProps};

    pub(crate) fn three_step_set() -> AdaptationSet {
        let mut playlist = Playlist::new(PlaylistProps::default());
        let p = playlist.add_period(Period::default());
        let s = playlist.add_adaptation_set(p, AdaptationSet::default());
        playlist.add_representation(p, s, "lo", 400_000);
        playlist.add_representation(p, s, "mid", 1_200_000);
        playlist.add_representation(p, s, "hi", 3_500_000);
        playlist.periods()[0].sets[0].clone()
    }

    #[test]
    fn test_fixed_strategies() {
        let set = three_step_set();
        let mut best = AlwaysBestLogic {
            selector: RepresentationSelector::default(),
        };
        assert_eq!(best.next_representation(0, &set, None), Some(2));

        let mut lowest = AlwaysLowestLogic {
            selector: RepresentationSelector::default(),
        };
        assert_eq!(lowest.next_representation(0, &set, Some(2)), Some(0));

        let mut fixed = FixedRateLogic {
            bitrate: 1_500_000,
            selector: RepresentationSelector::default(),
        };
        assert_eq!(fixed.next_representation(0, &set, None), Some(1));

        // zero budget degrades to the lowest rung
        let mut fixed = FixedRateLogic {
            bitrate: 0,
            selector: RepresentationSelector::default(),
        };
        assert_eq!(fixed.next_representation(0, &set, None), Some(0));
    }

    #[test]
    fn test_factory_honors_strategy() {
        let mut options = StreamingOptions::default();
        options.adaptation_strategy = AdaptationStrategy::AlwaysLowest;
        let mut logic = create_logic(&options);
        let set = three_step_set();
        assert_eq!(logic.next_representation(0, &set, None), Some(0));
    }
}
