//! Connection and transfer management.
//!
//! The [`ConnectionManager`] hands out [`ChunkSource`]s, schedules them on
//! one of two priority queues, pools idle connections per origin and keeps
//! a small cache of completed metadata bodies so a representation switch
//! does not re-download init data it just had.

pub mod chunk;
pub mod connection;
mod downloader;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use url::Url;

use crate::error::{HibikiError, HibikiResult};
use crate::logic::StreamId;
use crate::options::StreamingOptions;
use crate::playlist::ByteRange;
use crate::time::Tick;

pub use chunk::{ChunkSource, ChunkType};
pub use connection::{
    Connection, ConnectionFactory, ConnectionParams, HttpClient, RequestStatus, MAX_REDIRECTS,
};

use downloader::Downloader;

/// Total bytes the recycle cache may hold.
const CACHE_MAX_BYTES: usize = 2 * 1024 * 1024;
/// Bodies larger than this are never recycled.
const CACHE_MAX_ENTRY_BYTES: usize = 256 * 1024;
const CACHE_MAX_ENTRIES: usize = 32;

/// Immutable bodies worth keeping across representation switches. Live
/// playlists and keys change or are cached elsewhere.
fn is_cacheable(chunk_type: ChunkType) -> bool {
    matches!(chunk_type, ChunkType::Init | ChunkType::Index)
}

/// Receives one sample per completed transfer.
pub trait DownloadRateObserver: Send + Sync {
    fn update_download_rate(&self, id: StreamId, bytes: usize, elapsed: Tick, latency: Tick);
}

pub(crate) struct ManagerCore {
    pool: Mutex<Vec<Connection>>,
    factories: Vec<ConnectionFactory>,
    local_allowed: bool,
    request_timeout: Option<Duration>,
    rate_observer: Mutex<Option<Arc<dyn DownloadRateObserver>>>,
}

impl ManagerCore {
    fn pool(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Idle pooled connection for this origin, or a fresh one from the
    /// first factory that handles it.
    pub(crate) fn acquire(&self, params: &ConnectionParams) -> HibikiResult<Connection> {
        if params.is_local() && !self.local_allowed {
            return Err(HibikiError::LocalNotAllowed(params.url().to_string()));
        }
        {
            let mut pool = self.pool();
            if let Some(at) = pool.iter().position(|c| c.can_reuse(params)) {
                let mut connection = pool.swap_remove(at);
                connection.set_used(true);
                return Ok(connection);
            }
        }
        let factory = self
            .factories
            .iter()
            .find(|f| f.handles(params))
            .ok_or_else(|| {
                HibikiError::InvalidConfiguration(format!(
                    "no connection factory for {}",
                    params.url()
                ))
            })?;
        let mut connection = factory.create(params.clone());
        connection.set_used(true);
        Ok(connection)
    }

    pub(crate) fn release(&self, mut connection: Connection) {
        connection.set_used(false);
        self.pool().push(connection);
    }

    pub(crate) fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub(crate) fn report_rate(&self, id: StreamId, bytes: usize, elapsed: Tick, latency: Tick) {
        let observer = self
            .rate_observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(observer) = observer {
            observer.update_download_rate(id, bytes, elapsed, latency);
        }
    }
}

struct RecycleCache {
    entries: LruCache<String, Bytes>,
    total: usize,
}

impl RecycleCache {
    fn new() -> Self {
        Self {
            entries: LruCache::new(
                NonZeroUsize::new(CACHE_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            ),
            total: 0,
        }
    }

    fn get(&mut self, url: &Url) -> Option<Bytes> {
        self.entries.get(url.as_str()).cloned()
    }

    fn insert(&mut self, url: &Url, body: Bytes) {
        if body.len() > CACHE_MAX_ENTRY_BYTES {
            return;
        }
        if let Some(old) = self.entries.put(url.to_string(), body.clone()) {
            self.total -= old.len();
        }
        self.total += body.len();
        while self.total > CACHE_MAX_BYTES {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.total -= evicted.len(),
                None => break,
            }
        }
    }
}

pub struct ConnectionManager {
    core: Arc<ManagerCore>,
    queue: Downloader,
    priority_queue: Downloader,
    cache: Mutex<RecycleCache>,
}

impl ConnectionManager {
    pub fn new(options: &StreamingOptions) -> HibikiResult<Self> {
        let client = HttpClient::new(reqwest::Client::builder())?;
        let mut factories = vec![ConnectionFactory::Http(client)];
        if options.allow_local {
            factories.push(ConnectionFactory::Local);
        }
        let core = Arc::new(ManagerCore {
            pool: Mutex::new(Vec::new()),
            factories,
            local_allowed: options.allow_local,
            request_timeout: options.request_timeout,
            rate_observer: Mutex::new(None),
        });
        Ok(Self {
            queue: Downloader::spawn("media", core.clone()),
            priority_queue: Downloader::spawn("priority", core.clone()),
            core,
            cache: Mutex::new(RecycleCache::new()),
        })
    }

    pub fn set_rate_observer(&self, observer: Arc<dyn DownloadRateObserver>) {
        *self
            .core
            .rate_observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(observer);
    }

    fn cache(&self) -> MutexGuard<'_, RecycleCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build a source for one transfer. A recycle-cache hit comes back
    /// already complete and never touches the network (and thus never
    /// produces a rate sample).
    pub fn make_source(
        &self,
        url: Url,
        stream_id: StreamId,
        chunk_type: ChunkType,
        range: Option<ByteRange>,
    ) -> HibikiResult<ChunkSource> {
        let params = ConnectionParams::new(url.clone());
        if params.is_local() && !self.core.local_allowed {
            return Err(HibikiError::LocalNotAllowed(url.to_string()));
        }
        if range.is_none() && is_cacheable(chunk_type) {
            if let Some(body) = self.cache().get(&url) {
                tracing::trace!(%url, "serving from recycle cache");
                return Ok(ChunkSource::completed(url, stream_id, chunk_type, body));
            }
        }
        Ok(ChunkSource::new(url, stream_id, chunk_type, range))
    }

    /// Queue the transfer on the priority class its type demands.
    pub fn start(&self, chunk: &ChunkSource) {
        if chunk.is_done() {
            return;
        }
        if chunk.chunk_type().is_high_priority() {
            self.priority_queue.schedule(chunk.clone());
        } else {
            self.queue.schedule(chunk.clone());
        }
    }

    pub fn cancel(&self, chunk: &ChunkSource) {
        chunk.cancel();
    }

    /// Offer a finished source's body back for reuse. Only cleanly
    /// completed, unranged metadata transfers are kept.
    pub fn recycle_source(&self, chunk: &ChunkSource) {
        if !is_cacheable(chunk.chunk_type()) || chunk.range().is_some() {
            return;
        }
        if let Some(body) = chunk.complete_body() {
            self.cache().insert(chunk.url(), body);
        }
    }

    pub fn close_all_connections(&self) {
        self.core.pool().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(&StreamingOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_local_urls_are_rejected_by_default() {
        let m = manager();
        let err = m
            .make_source(
                Url::parse("file:///etc/passwd").unwrap(),
                0,
                ChunkType::Media,
                None,
            )
            .err();
        assert!(matches!(err, Some(HibikiError::LocalNotAllowed(_))));

        let mut options = StreamingOptions::default();
        options.allow_local = true;
        let m = ConnectionManager::new(&options).unwrap();
        assert!(m
            .make_source(
                Url::parse("file:///tmp/seg.ts").unwrap(),
                0,
                ChunkType::Media,
                None,
            )
            .is_ok());
    }

    #[tokio::test]
    async fn test_recycled_body_is_served_complete() {
        let m = manager();
        let url = Url::parse("https://cdn.example.com/init.mp4").unwrap();
        let source = m
            .make_source(url.clone(), 0, ChunkType::Init, None)
            .unwrap();
        source.push(Bytes::from_static(b"ftypisom"));
        source.finish();
        m.recycle_source(&source);

        let hit = m.make_source(url, 1, ChunkType::Init, None).unwrap();
        assert!(hit.is_done());
        assert_eq!(&hit.read_all().await.unwrap()[..], b"ftypisom");
    }

    #[tokio::test]
    async fn test_media_bodies_are_not_recycled() {
        let m = manager();
        let url = Url::parse("https://cdn.example.com/seg1.ts").unwrap();
        let source = m
            .make_source(url.clone(), 0, ChunkType::Media, None)
            .unwrap();
        source.push(Bytes::from_static(b"payload"));
        source.finish();
        m.recycle_source(&source);

        let miss = m.make_source(url, 0, ChunkType::Media, None).unwrap();
        assert!(!miss.is_done());
    }

    #[test]
    fn test_cache_evicts_by_total_size() {
        let mut cache = RecycleCache::new();
        let big = Bytes::from(vec![0u8; CACHE_MAX_ENTRY_BYTES]);
        for i in 0..10 {
            let url = Url::parse(&format!("https://cdn.example.com/{i}.mp4")).unwrap();
            cache.insert(&url, big.clone());
        }
        assert!(cache.total <= CACHE_MAX_BYTES);

        // oversized entries are refused outright
        let url = Url::parse("https://cdn.example.com/huge.mp4").unwrap();
        cache.insert(&url, Bytes::from(vec![0u8; CACHE_MAX_ENTRY_BYTES + 1]));
        assert!(cache.get(&url).is_none());
    }
}
