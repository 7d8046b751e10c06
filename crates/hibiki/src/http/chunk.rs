//! Chunk sources.
//!
//! A [`ChunkSource`] describes one requested transfer and buffers its bytes
//! as the downloader produces them. The consumer side drains the buffer
//! with [`ChunkSource::read`]; production and consumption run on different
//! tasks and meet at a notify.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{HibikiError, HibikiResult};
use crate::logic::StreamId;
use crate::playlist::ByteRange;

/// What the bytes are for. Everything except media rides the
/// high-priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Init,
    Index,
    Media,
    Playlist,
    Key,
}

impl ChunkType {
    pub fn is_high_priority(&self) -> bool {
        !matches!(self, ChunkType::Media)
    }
}

#[derive(Default)]
struct ChunkState {
    /// Every block produced so far. Blocks are retained after consumption
    /// (reads advance `read_index`) so a cleanly finished source can still
    /// hand its body to the recycle cache.
    blocks: Vec<Bytes>,
    read_index: usize,
    total_bytes: usize,
    content_length: Option<u64>,
    done: bool,
    failed: bool,
    error: Option<HibikiError>,
}

struct ChunkInner {
    url: Url,
    stream_id: StreamId,
    chunk_type: ChunkType,
    range: Option<ByteRange>,
    state: Mutex<ChunkState>,
    notify: Notify,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct ChunkSource {
    inner: Arc<ChunkInner>,
}

impl ChunkSource {
    pub fn new(
        url: Url,
        stream_id: StreamId,
        chunk_type: ChunkType,
        range: Option<ByteRange>,
    ) -> Self {
        Self {
            inner: Arc::new(ChunkInner {
                url,
                stream_id,
                chunk_type,
                range,
                state: Mutex::new(ChunkState::default()),
                notify: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// A source born complete, served out of the recycle cache.
    pub(crate) fn completed(
        url: Url,
        stream_id: StreamId,
        chunk_type: ChunkType,
        body: Bytes,
    ) -> Self {
        let source = Self::new(url, stream_id, chunk_type, None);
        source.push(body);
        source.finish();
        source
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn stream_id(&self) -> StreamId {
        self.inner.stream_id
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.inner.chunk_type
    }

    pub fn range(&self) -> Option<&ByteRange> {
        self.inner.range.as_ref()
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    fn state(&self) -> MutexGuard<'_, ChunkState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn set_content_length(&self, length: Option<u64>) {
        self.state().content_length = length;
    }

    pub fn content_length(&self) -> Option<u64> {
        self.state().content_length
    }

    pub(crate) fn push(&self, bytes: Bytes) {
        {
            let mut state = self.state();
            state.total_bytes += bytes.len();
            state.blocks.push(bytes);
        }
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn finish(&self) {
        self.state().done = true;
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn fail(&self, error: HibikiError) {
        {
            let mut state = self.state();
            state.error = Some(error);
            state.failed = true;
            state.done = true;
        }
        self.inner.notify.notify_waiters();
    }

    /// Stop the transfer. Buffered bytes stay readable; the next read past
    /// them reports the cancellation.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        self.fail(HibikiError::Canceled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.state().done
    }

    pub fn total_bytes(&self) -> usize {
        self.state().total_bytes
    }

    fn try_read(&self) -> Option<HibikiResult<Option<Bytes>>> {
        let mut state = self.state();
        if let Some(bytes) = state.blocks.get(state.read_index).cloned() {
            state.read_index += 1;
            return Some(Ok(Some(bytes)));
        }
        if state.done {
            return Some(match state.error.take() {
                Some(error) => Err(error),
                None => Ok(None),
            });
        }
        None
    }

    /// Next buffered block, `None` at the clean end of the transfer.
    pub async fn read(&self) -> HibikiResult<Option<Bytes>> {
        loop {
            if let Some(result) = self.try_read() {
                return result;
            }
            // register before the recheck so a producer wake between the
            // two cannot be lost
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(result) = self.try_read() {
                return result;
            }
            notified.await;
        }
    }

    /// Drain the whole transfer into one buffer.
    pub async fn read_all(&self) -> HibikiResult<Bytes> {
        let mut out = BytesMut::new();
        while let Some(bytes) = self.read().await? {
            out.extend_from_slice(&bytes);
        }
        Ok(out.freeze())
    }

    /// Completed body of a cleanly finished transfer, read or not. This is
    /// what the recycle cache stores.
    pub(crate) fn complete_body(&self) -> Option<Bytes> {
        let state = self.state();
        if !state.done || state.failed {
            return None;
        }
        let mut out = BytesMut::with_capacity(state.total_bytes);
        for bytes in &state.blocks {
            out.extend_from_slice(bytes);
        }
        Some(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_source() -> ChunkSource {
        ChunkSource::new(
            Url::parse("https://cdn.example.com/seg1.ts").unwrap(),
            0,
            ChunkType::Media,
            None,
        )
    }

    #[tokio::test]
    async fn test_read_sees_pushed_bytes_then_eof() {
        let source = media_source();
        source.push(Bytes::from_static(b"hello "));
        source.push(Bytes::from_static(b"world"));
        source.finish();

        let all = source.read_all().await.unwrap();
        assert_eq!(&all[..], b"hello world");
        assert_eq!(source.total_bytes(), 11);
    }

    #[tokio::test]
    async fn test_read_blocks_until_producer_appears() {
        let source = media_source();
        let reader = source.clone();
        let handle = tokio::spawn(async move { reader.read_all().await });

        tokio::task::yield_now().await;
        source.push(Bytes::from_static(b"data"));
        source.finish();

        let all = handle.await.unwrap().unwrap();
        assert_eq!(&all[..], b"data");
    }

    #[tokio::test]
    async fn test_cancel_surfaces_after_buffered_bytes() {
        let source = media_source();
        source.push(Bytes::from_static(b"partial"));
        source.cancel();

        assert!(source.is_cancelled());
        let first = source.read().await.unwrap();
        assert_eq!(first.as_deref(), Some(&b"partial"[..]));
        assert!(matches!(source.read().await, Err(HibikiError::Canceled)));
    }

    #[tokio::test]
    async fn test_failed_transfer_is_not_recyclable() {
        let source = media_source();
        source.push(Bytes::from_static(b"oops"));
        source.fail(HibikiError::Timeout);
        assert!(source.complete_body().is_none());

        let ok = media_source();
        ok.push(Bytes::from_static(b"fine"));
        ok.finish();
        assert_eq!(ok.complete_body().unwrap(), Bytes::from_static(b"fine"));
    }

    #[tokio::test]
    async fn test_fully_read_source_is_still_recyclable() {
        let source = media_source();
        source.push(Bytes::from_static(b"ftyp"));
        source.push(Bytes::from_static(b"moov"));
        source.finish();

        let body = source.read_all().await.unwrap();
        assert_eq!(&body[..], b"ftypmoov");
        // draining the source must not cost it its recyclable body
        assert_eq!(source.complete_body().unwrap(), body);
    }

    #[test]
    fn test_priority_classes() {
        assert!(ChunkType::Init.is_high_priority());
        assert!(ChunkType::Key.is_high_priority());
        assert!(ChunkType::Playlist.is_high_priority());
        assert!(!ChunkType::Media.is_high_priority());
    }
}
