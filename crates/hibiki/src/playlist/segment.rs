use crate::time::{ScaledTime, Tick};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    pub fn to_http_range(&self) -> String {
        if let Some(length) = self.length {
            format!("bytes={}-{}", self.offset, self.offset + length - 1)
        } else {
            format!("bytes={}-", self.offset)
        }
    }

    pub fn contains(&self, byte: u64) -> bool {
        byte >= self.offset
            && match self.length {
                Some(length) => byte < self.offset + length,
                None => true,
            }
    }
}

/// Encryption method of a segment's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionMethod {
    #[default]
    None,
    Aes128,
}

/// Per-segment (or inherited) encryption description. Key bytes are not
/// stored here; they live in the keyring, addressed by `key_uri`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncryptionDescriptor {
    pub method: EncryptionMethod,
    pub key_uri: Option<String>,
    pub iv: Option<[u8; 16]>,
}

impl EncryptionDescriptor {
    pub fn is_encrypted(&self) -> bool {
        self.method != EncryptionMethod::None
    }

    /// AES-128-CBC IV, falling back to the big-endian sequence number as
    /// HLS mandates when no explicit IV is present.
    pub fn effective_iv(&self, sequence: u64) -> [u8; 16] {
        self.iv
            .unwrap_or_else(|| (sequence as u128).to_be_bytes())
    }
}

/// One fetchable unit of media.
///
/// Timing is expressed in the owning node's timescale; the URL is already
/// resolved (template segments get theirs filled in on lookup).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    pub start_time: ScaledTime,
    pub duration: ScaledTime,
    pub url: Option<String>,
    pub byte_range: Option<ByteRange>,
    pub discontinuity: bool,
    pub discontinuity_sequence: u64,
    pub display_time: Option<Tick>,
}

impl Segment {
    pub fn new(sequence: u64, start_time: ScaledTime, duration: ScaledTime) -> Self {
        Self {
            sequence,
            start_time,
            duration,
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_byte_range(mut self, range: ByteRange) -> Self {
        self.byte_range = Some(range);
        self
    }

    pub fn offset(&self) -> u64 {
        self.byte_range.as_ref().map(|r| r.offset).unwrap_or(0)
    }
}

/// Initialization/index segments only differ from media segments by how the
/// stream manager schedules them (high-priority queue, fetched once).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitSegment {
    pub url: String,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSegment {
    pub url: String,
    pub byte_range: Option<ByteRange>,
}

/// Byte-range index entry used to split a [`crate::playlist::SegmentBase`]
/// single segment into addressable sub-segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPoint {
    pub offset: u64,
    pub time: ScaledTime,
    pub duration: ScaledTime,
}

/// Find the segment covering `time` in a start-time-ordered slice.
///
/// Half-open intervals: a segment covers `[start, start + duration)`.
/// Returns `None` when the slice is empty or `time` precedes the first
/// segment.
pub(crate) fn find_segment_number_by_scaled_time(
    segments: &[Segment],
    time: ScaledTime,
) -> Option<u64> {
    let mut found: Option<&Segment> = None;
    for seg in segments {
        if seg.start_time > time {
            break;
        }
        found = Some(seg);
    }
    found.map(|s| s.sequence)
}
