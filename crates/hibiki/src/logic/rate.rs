use crate::logic::average::MovingAverage;
use crate::logic::selector::RepresentationSelector;
use crate::logic::{AdaptationLogic, StreamId};
use crate::playlist::AdaptationSet;
use crate::time::{Tick, TICKS_PER_SECOND};

/// Throughput-driven strategy.
///
/// Keeps a smoothed estimate of observed download rate plus the bandwidth
/// already committed to other active streams, and picks the best
/// representation that fits in what is left.
pub struct RateBasedLogic {
    selector: RepresentationSelector,
    average: MovingAverage,
    current_bps: u64,
    used_bps: u64,
}

impl RateBasedLogic {
    pub fn new(selector: RepresentationSelector) -> Self {
        Self {
            selector,
            average: MovingAverage::default(),
            current_bps: 0,
            used_bps: 0,
        }
    }

    /// Bandwidth this stream may spend: the shared estimate minus what the
    /// other streams reserved. The stream's own reservation is its to
    /// re-spend.
    fn available_bps(&self, own_bps: Option<u64>) -> u64 {
        self.current_bps.saturating_sub(self.used_bps) + own_bps.unwrap_or(0)
    }
}

impl AdaptationLogic for RateBasedLogic {
    fn next_representation(
        &mut self,
        _id: StreamId,
        set: &AdaptationSet,
        current: Option<usize>,
    ) -> Option<usize> {
        if set.representations().is_empty() {
            return None;
        }
        if self.current_bps == 0 {
            // nothing observed yet, start conservative
            return current
                .filter(|&i| set.representations()[i].is_usable())
                .or_else(|| self.selector.lowest(set));
        }
        let own = current.map(|i| set.representations()[i].bandwidth);
        self.selector.select(set, self.available_bps(own))
    }

    fn update_download_rate(&mut self, _id: StreamId, bytes: usize, elapsed: Tick, _latency: Tick) {
        if elapsed <= 0 {
            return;
        }
        let bps = (bytes as u64 * 8).saturating_mul(TICKS_PER_SECOND as u64) / elapsed as u64;
        self.current_bps = self.average.push(bps);
    }

    fn on_representation_switch(&mut self, _id: StreamId, old_bps: Option<u64>, new_bps: u64) {
        if let Some(old) = old_bps {
            self.used_bps = self.used_bps.saturating_sub(old);
        }
        self.used_bps += new_bps;
    }
}
