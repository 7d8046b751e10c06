use std::collections::HashMap;

use crate::logic::average::MovingAverage;
use crate::logic::selector::RepresentationSelector;
use crate::logic::{AdaptationLogic, StreamId};
use crate::playlist::AdaptationSet;
use crate::time::{Tick, TICKS_PER_SECOND};

/// Per-stream buffering state the utility computation reads.
struct StreamContext {
    buffering_min: Tick,
    buffering_level: Tick,
    buffering_target: Tick,
    last_download_rate: u64,
    average: MovingAverage,
}

impl StreamContext {
    fn new() -> Self {
        Self {
            buffering_min: 0,
            buffering_level: 0,
            buffering_target: 0,
            last_download_rate: 0,
            average: MovingAverage::default(),
        }
    }
}

/// Buffer-occupancy utility maximization.
///
/// Each representation gets a logarithmic utility relative to the lowest
/// rung; the pick maximizes `(V(u + gammaP) - Q) / bitrate` where `Q` is
/// the current buffer level in seconds and `V` scales utility against the
/// buffering target. A buffer under its minimum short-circuits to the
/// lowest rung, and the winner is still capped by the bandwidth not
/// reserved by other streams.
pub struct NearOptimalLogic {
    selector: RepresentationSelector,
    streams: HashMap<StreamId, StreamContext>,
    utilities: HashMap<u64, f64>,
    used_bps: u64,
}

const GAMMA_P: f64 = 1.0;

impl NearOptimalLogic {
    pub fn new(selector: RepresentationSelector) -> Self {
        Self {
            selector,
            streams: HashMap::new(),
            utilities: HashMap::new(),
            used_bps: 0,
        }
    }

    fn utility(&mut self, min_bps: u64, bps: u64) -> f64 {
        *self
            .utilities
            .entry(bps)
            .or_insert_with(|| (bps as f64 / min_bps as f64).ln())
    }

    fn max_current_bw(&self) -> u64 {
        self.streams
            .values()
            .map(|ctx| ctx.last_download_rate)
            .max()
            .unwrap_or(0)
    }

    fn available_bps(&self, own_bps: Option<u64>) -> u64 {
        self.max_current_bw().saturating_sub(self.used_bps) + own_bps.unwrap_or(0)
    }

    fn quality_index(&mut self, set: &AdaptationSet, v_d: f64, q: f64) -> Option<usize> {
        let min_bps = set.representations().first()?.bandwidth;
        let mut best: Option<(usize, f64)> = None;
        let Some(cap) = self.selector.highest(set) else {
            return None;
        };
        for i in 0..=cap {
            if !set.representations()[i].is_usable() {
                continue;
            }
            let bps = set.representations()[i].bandwidth;
            let utility = self.utility(min_bps, bps);
            let score = (v_d * (utility + GAMMA_P) - q) / bps as f64;
            if best.map_or(true, |(_, s)| score >= s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl AdaptationLogic for NearOptimalLogic {
    fn next_representation(
        &mut self,
        id: StreamId,
        set: &AdaptationSet,
        current: Option<usize>,
    ) -> Option<usize> {
        if set.representations().is_empty() {
            return None;
        }
        let own = current.map(|i| set.representations()[i].bandwidth);
        let bps = self.available_bps(own);

        let (min_level, level, target) = match self.streams.get(&id) {
            Some(ctx) => (ctx.buffering_min, ctx.buffering_level, ctx.buffering_target),
            // buffering has not started, only bandwidth can decide
            None => return self.selector.select(set, bps),
        };
        if level < min_level {
            return self.selector.lowest(set);
        }

        let q = level as f64 / TICKS_PER_SECOND as f64;
        let target_secs = target.max(min_level) as f64 / TICKS_PER_SECOND as f64;
        let min_bps = set.representations()[0].bandwidth;
        let max_bps = set.representations()[set.representations().len() - 1].bandwidth;
        let u_max = self.utility(min_bps, max_bps);
        let v_d = target_secs / (u_max + GAMMA_P);

        let picked = self.quality_index(set, v_d, q)?;
        if set.representations()[picked].bandwidth > bps && bps > 0 {
            return self.selector.select(set, bps);
        }
        Some(picked)
    }

    fn update_download_rate(&mut self, id: StreamId, bytes: usize, elapsed: Tick, _latency: Tick) {
        if elapsed <= 0 {
            return;
        }
        let bps = (bytes as u64 * 8).saturating_mul(TICKS_PER_SECOND as u64) / elapsed as u64;
        let ctx = self.streams.entry(id).or_insert_with(StreamContext::new);
        ctx.last_download_rate = ctx.average.push(bps);
    }

    fn on_representation_switch(&mut self, _id: StreamId, old_bps: Option<u64>, new_bps: u64) {
        if let Some(old) = old_bps {
            self.used_bps = self.used_bps.saturating_sub(old);
        }
        self.used_bps += new_bps;
    }

    fn on_buffering_update(&mut self, id: StreamId, min: Tick, level: Tick, target: Tick) {
        let ctx = self.streams.entry(id).or_insert_with(StreamContext::new);
        ctx.buffering_min = min;
        ctx.buffering_level = level;
        ctx.buffering_target = target;
    }
}

/// Optimistic strategy scaling the bandwidth budget by buffer fullness:
/// a full buffer spends the whole estimate, a draining one backs off
/// proportionally before the rebuffer hits.
pub struct PredictiveLogic {
    selector: RepresentationSelector,
    streams: HashMap<StreamId, StreamContext>,
    used_bps: u64,
}

impl PredictiveLogic {
    pub fn new(selector: RepresentationSelector) -> Self {
        Self {
            selector,
            streams: HashMap::new(),
            used_bps: 0,
        }
    }

    fn max_current_bw(&self) -> u64 {
        self.streams
            .values()
            .map(|ctx| ctx.last_download_rate)
            .max()
            .unwrap_or(0)
    }
}

impl AdaptationLogic for PredictiveLogic {
    fn next_representation(
        &mut self,
        id: StreamId,
        set: &AdaptationSet,
        current: Option<usize>,
    ) -> Option<usize> {
        if set.representations().is_empty() {
            return None;
        }
        let bw = self.max_current_bw();
        if bw == 0 {
            // nothing measured, bet on the best and let reality correct us
            return self.selector.highest(set);
        }
        let own = current.map(|i| set.representations()[i].bandwidth);
        let available = bw.saturating_sub(self.used_bps) + own.unwrap_or(0);

        let ratio = match self.streams.get(&id) {
            Some(ctx) if ctx.buffering_target > 0 => {
                (ctx.buffering_level as f64 / ctx.buffering_target as f64).clamp(0.0, 1.0)
            }
            _ => 1.0,
        };
        self.selector.select(set, (available as f64 * ratio) as u64)
    }

    fn update_download_rate(&mut self, id: StreamId, bytes: usize, elapsed: Tick, _latency: Tick) {
        if elapsed <= 0 {
            return;
        }
        let bps = (bytes as u64 * 8).saturating_mul(TICKS_PER_SECOND as u64) / elapsed as u64;
        let ctx = self.streams.entry(id).or_insert_with(StreamContext::new);
        ctx.last_download_rate = ctx.average.push(bps);
    }

    fn on_representation_switch(&mut self, _id: StreamId, old_bps: Option<u64>, new_bps: u64) {
        if let Some(old) = old_bps {
            self.used_bps = self.used_bps.saturating_sub(old);
        }
        self.used_bps += new_bps;
    }

    fn on_buffering_update(&mut self, id: StreamId, min: Tick, level: Tick, target: Tick) {
        let ctx = self.streams.entry(id).or_insert_with(StreamContext::new);
        ctx.buffering_min = min;
        ctx.buffering_level = level;
        ctx.buffering_target = target;
    }
}
