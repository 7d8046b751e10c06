//! Stream progression.
//!
//! A [`Stream`] tracks one elementary stream's position inside the
//! playlist: which representation it is locked to, the next sequence
//! number to fetch, and how much media it has pushed downstream. The
//! [`manager`] drives every stream from its own task.

pub mod manager;

use bytes::Bytes;

use crate::playlist::{RepresentationKey, StreamFormat};
use crate::time::Tick;

pub use crate::logic::StreamId;

/// One downloaded piece of media, in playback order.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub stream_id: StreamId,
    pub sequence: u64,
    pub format: StreamFormat,
    /// True for initialization data that must precede media.
    pub is_init: bool,
    /// A timeline break right before this chunk.
    pub discontinuity: bool,
    pub display_time: Option<Tick>,
    pub duration: Tick,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    key: RepresentationKey,
    next_sequence: u64,
    /// Init data for the current representation was already delivered.
    init_sent: bool,
    format: StreamFormat,
    discontinuity_sequence: u64,
}

impl Stream {
    pub fn new(id: StreamId, key: RepresentationKey, start_sequence: u64) -> Self {
        Self {
            id,
            key,
            next_sequence: start_sequence,
            init_sent: false,
            format: StreamFormat::Unknown,
            discontinuity_sequence: 0,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn representation(&self) -> RepresentationKey {
        self.key
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub(crate) fn set_format(&mut self, format: StreamFormat) {
        self.format = format;
    }

    /// Move to another representation within the same set. Forces a fresh
    /// init chunk before the next media chunk.
    pub(crate) fn switch_representation(&mut self, key: RepresentationKey) {
        if key != self.key {
            self.key = key;
            self.init_sent = false;
        }
    }

    pub(crate) fn needs_init(&self) -> bool {
        !self.init_sent
    }

    pub(crate) fn mark_init_sent(&mut self) {
        self.init_sent = true;
    }

    /// Note a delivered media segment and report whether it opened a new
    /// discontinuity run.
    pub(crate) fn advance(&mut self, sequence: u64, discontinuity_sequence: u64) -> bool {
        self.next_sequence = sequence + 1;
        let changed = discontinuity_sequence != self.discontinuity_sequence;
        self.discontinuity_sequence = discontinuity_sequence;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RepresentationKey {
        RepresentationKey {
            period: 0,
            set: 0,
            representation: 0,
        }
    }

    #[test]
    fn test_switch_forces_new_init() {
        let mut stream = Stream::new(1, key(), 5);
        assert!(stream.needs_init());
        stream.mark_init_sent();
        assert!(!stream.needs_init());

        // same key: no-op
        stream.switch_representation(key());
        assert!(!stream.needs_init());

        let other = RepresentationKey {
            representation: 2,
            ..key()
        };
        stream.switch_representation(other);
        assert!(stream.needs_init());
        assert_eq!(stream.representation(), other);
    }

    #[test]
    fn test_advance_tracks_discontinuities() {
        let mut stream = Stream::new(1, key(), 0);
        assert!(!stream.advance(0, 0));
        assert!(!stream.advance(1, 0));
        assert_eq!(stream.next_sequence(), 2);
        // discontinuity run changes
        assert!(stream.advance(2, 1));
        assert!(!stream.advance(3, 1));
    }
}
