//! Template-based segment addressing.
//!
//! Segments are synthesized on lookup from a URL pattern carrying
//! `$Identifier$` substitution fields, either against an attached timeline
//! or arithmetically from a constant segment duration.

use std::sync::LazyLock;

use regex::{Captures, Regex, Replacer};

use crate::playlist::attrs::{AttrsTree, NodeId, Payload, TemplateContext};
use crate::playlist::segment::{InitSegment, Segment};
use crate::time::{ScaledTime, Tick};

// Only %0[width]d is permitted as a format suffix, so substitution is a
// plain regex replace rather than a printf reimplementation.
static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(RepresentationID|Number|Time|Bandwidth)(?:%0(\d)d)?\$")
        .unwrap()
});

/// Substitution values for one lookup. Unknown identifiers are left in
/// place so a malformed pattern surfaces in the request URL instead of
/// silently producing a different one.
struct Substitution<'a> {
    context: Option<&'a TemplateContext>,
    number: Option<u64>,
    time: Option<ScaledTime>,
}

impl Replacer for Substitution<'_> {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut String) {
        let value = match &caps[1] {
            "RepresentationID" => self
                .context
                .and_then(|c| c.representation_id.clone()),
            "Bandwidth" => self
                .context
                .and_then(|c| c.bandwidth)
                .map(|b| b.to_string()),
            "Number" => self.number.map(|n| n.to_string()),
            "Time" => self.time.map(|t| t.to_string()),
            _ => None,
        };
        let Some(value) = value else {
            dst.push_str(&caps[0]);
            return;
        };
        match caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
            Some(width) => dst.push_str(&format!("{value:0>width$}")),
            None => dst.push_str(&value),
        }
    }
}

fn resolve(
    pattern: &str,
    context: Option<&TemplateContext>,
    number: Option<u64>,
    time: Option<ScaledTime>,
) -> String {
    IDENTIFIER_REGEX
        .replace_all(
            pattern,
            Substitution {
                context,
                number,
                time,
            },
        )
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct SegmentTemplate {
    pub media: Option<String>,
    pub initialization: Option<String>,
}

impl AttrsTree {
    pub(crate) fn template_media_segment(&self, node: NodeId, number: u64) -> Option<Segment> {
        let template = self.template_payload(node)?;
        let pattern = template.media.clone()?;
        let (start, duration) = self.template_timing(node, number)?;
        let url = resolve(
            &pattern,
            self.template_context(node),
            Some(number),
            Some(start),
        );
        let mut segment = Segment::new(number, start, duration).with_url(url);
        segment.display_time = Some(self.template_timescale(node).to_time(start));
        Some(segment)
    }

    pub(crate) fn template_init_segment(&self, node: NodeId) -> Option<InitSegment> {
        let template = self.template_payload(node)?;
        let pattern = template.initialization.clone()?;
        Some(InitSegment {
            url: resolve(&pattern, self.template_context(node), None, None),
            byte_range: None,
        })
    }

    pub(crate) fn template_start_segment_number(&self, node: NodeId) -> u64 {
        if let Some(timeline) = self.timeline(node) {
            if let Some(number) = timeline.min_element_number() {
                return number;
            }
        }
        self.inherit_start_number(node).unwrap_or(1)
    }

    pub(crate) fn template_segment_number_by_time(&self, node: NodeId, time: Tick) -> Option<u64> {
        if let Some(timeline) = self.timeline(node) {
            let timescale = self.template_timescale(node);
            return timeline.element_number_by_scaled_time(timescale.to_scaled(time));
        }
        let duration = self.inherit_duration(node);
        if duration <= 0 {
            return None;
        }
        let timescale = self.inherit_timescale(node);
        let start_number = self.inherit_start_number(node).unwrap_or(1);
        Some(start_number + (timescale.to_scaled(time) / duration) as u64)
    }

    pub(crate) fn template_playback_time_duration(
        &self,
        node: NodeId,
        number: u64,
    ) -> Option<(Tick, Tick)> {
        let timescale = self.template_timescale(node);
        let (start, duration) = self.template_timing(node, number)?;
        Some((timescale.to_time(start), timescale.to_time(duration)))
    }

    pub(crate) fn template_min_ahead_time(&self, node: NodeId, number: u64) -> Tick {
        if let Some(timeline) = self.timeline(node) {
            let timescale = self.template_timescale(node);
            return timescale.to_time(timeline.min_ahead_scaled_time(number));
        }
        0
    }

    /// Segment number at the live edge of a duration-based template:
    /// elapsed presentation time divided by constant segment duration,
    /// offset by the start number.
    pub(crate) fn template_live_number(
        &self,
        node: NodeId,
        now: Tick,
        availability_start: Tick,
    ) -> Option<u64> {
        if self.timeline(node).is_some() {
            return None;
        }
        let duration = self.inherit_duration(node);
        if duration <= 0 || now < availability_start {
            return None;
        }
        let timescale = self.inherit_timescale(node);
        let elapsed = timescale.to_scaled(now - availability_start);
        let start_number = self.inherit_start_number(node).unwrap_or(1);
        Some(start_number + (elapsed / duration) as u64)
    }

    pub(crate) fn template_prune_by_sequence(&mut self, node: NodeId, below: u64) {
        if let Some(id) = self.inherit_segment_timeline(node) {
            if let Payload::Timeline(timeline) = self.payload_mut(id) {
                timeline.prune_by_sequence_number(below);
            }
        }
    }

    pub(crate) fn template_prune_by_time(&mut self, node: NodeId, time: Tick) {
        let timescale = self.template_timescale(node);
        if let Some(id) = self.inherit_segment_timeline(node) {
            if let Payload::Timeline(timeline) = self.payload_mut(id) {
                timeline.prune_by_scaled_time(timescale.to_scaled(time));
            }
        }
    }

    /// Scaled (start, duration) of segment `number`, timeline path or
    /// constant-duration arithmetic.
    fn template_timing(&self, node: NodeId, number: u64) -> Option<(ScaledTime, ScaledTime)> {
        if let Some(timeline) = self.timeline(node) {
            return timeline.scaled_time_duration_by_element_number(number);
        }
        let duration = self.inherit_duration(node);
        if duration <= 0 {
            return None;
        }
        let start_number = self.inherit_start_number(node).unwrap_or(1);
        if number < start_number {
            return None;
        }
        let start = (number - start_number) as i64 * duration;
        Some((start, duration))
    }

    /// Timescale governing this template's timing values. When a timeline
    /// is attached its own declaration level wins.
    fn template_timescale(&self, node: NodeId) -> crate::time::Timescale {
        match self.inherit_segment_timeline(node) {
            Some(id) => self.inherit_timescale(id),
            None => self.inherit_timescale(node),
        }
    }

    fn template_payload(&self, node: NodeId) -> Option<&SegmentTemplate> {
        match self.payload(node) {
            Payload::Template(template) => Some(template),
            _ => None,
        }
    }
}
