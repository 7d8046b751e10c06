use std::collections::VecDeque;

use crate::error::{HibikiError, HibikiResult};

const DEFAULT_WINDOW: usize = 10;

/// Volatility-weighted moving average of observed download rates.
///
/// The smoothing factor adapts to how noisy the window is: a window whose
/// total movement is dominated by one swing keeps more history, while a
/// steadily drifting one follows the latest sample faster.
#[derive(Debug)]
pub struct MovingAverage {
    window: VecDeque<u64>,
    capacity: usize,
    current: f64,
}

impl MovingAverage {
    pub fn new(samples: usize) -> HibikiResult<Self> {
        if samples < 1 {
            return Err(HibikiError::InvalidConfiguration(
                "moving average window must hold at least one sample".to_string(),
            ));
        }
        Ok(Self {
            window: VecDeque::with_capacity(samples),
            capacity: samples,
            current: 0.0,
        })
    }

    pub fn push(&mut self, value: u64) -> u64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);

        if self.window.len() == 1 {
            self.current = value as f64;
            return value;
        }

        let mut diff_sum = 0u64;
        let mut min = u64::MAX;
        let mut max = 0u64;
        let mut prev: Option<u64> = None;
        for &v in &self.window {
            if let Some(p) = prev {
                diff_sum += v.abs_diff(p);
            }
            min = min.min(v);
            max = max.max(v);
            prev = Some(v);
        }

        let alpha = if diff_sum > 0 {
            (max - min) as f64 / diff_sum as f64
        } else {
            0.5
        };
        self.current = alpha * self.current + (1.0 - alpha) * value as f64;
        self.get()
    }

    pub fn get(&self) -> u64 {
        self.current as u64
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(DEFAULT_WINDOW),
            capacity: DEFAULT_WINDOW,
            current: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_window() {
        assert!(matches!(
            MovingAverage::new(0),
            Err(HibikiError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_constant_input_converges() {
        let mut avg = MovingAverage::default();
        for _ in 0..10 {
            avg.push(1_000_000);
        }
        assert_eq!(avg.get(), 1_000_000);
    }

    #[test]
    fn test_step_change_adopted_once_sustained() {
        let mut avg = MovingAverage::default();
        for _ in 0..10 {
            avg.push(1_000_000);
        }
        // a lone spike accounts for all of the window's movement and is
        // smoothed away entirely
        assert_eq!(avg.push(4_000_000), 1_000_000);
        // a sustained change wins once it dominates the window
        for _ in 0..20 {
            avg.push(4_000_000);
        }
        assert!(avg.get() > 3_000_000);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut avg = MovingAverage::new(4).unwrap();
        for i in 0..100 {
            avg.push(i * 1000);
        }
        assert_eq!(avg.window.len(), 4);
    }
}
