use std::time::Duration;

use serde::Deserialize;

use crate::time::Tick;

/// Adaptation strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptationStrategy {
    AlwaysBest,
    AlwaysLowest,
    FixedRate,
    RateBased,
    Predictive,
    #[default]
    NearOptimal,
}

/// User-facing configuration of the streaming core.
///
/// Every override is optional; unset values fall back to manifest-declared
/// hints and the built-in defaults of the buffering logic.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingOptions {
    /// Device resolution cap. Representations exceeding either dimension
    /// are never selected while a fitting one exists.
    pub max_width: u32,
    pub max_height: u32,

    pub adaptation_strategy: AdaptationStrategy,
    /// Target bitrate for [`AdaptationStrategy::FixedRate`], bits/sec.
    pub fixed_bitrate: u64,

    pub min_buffering: Option<Tick>,
    pub max_buffering: Option<Tick>,
    pub live_delay: Option<Tick>,
    pub low_latency: Option<bool>,

    /// Per-request deadline; `None` waits indefinitely.
    #[serde(with = "humantime_opt")]
    pub request_timeout: Option<Duration>,

    /// Whether non-network (file) URLs may be fetched.
    pub allow_local: bool,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            max_width: u32::MAX,
            max_height: u32::MAX,
            adaptation_strategy: AdaptationStrategy::default(),
            fixed_bitrate: 0,
            min_buffering: None,
            max_buffering: None,
            live_delay: None,
            low_latency: None,
            request_timeout: None,
            allow_local: false,
        }
    }
}

mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}
