//! Session orchestration.
//!
//! The [`PlaylistManager`] owns the playlist, the connection manager, the
//! keyring and the adaptation logic, and drives every stream from its own
//! task: refresh the manifest when live playback needs it, let the logic
//! pick a representation, fetch (and decrypt) the next segment, hand it to
//! the consumer, pace against the buffering targets.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{HibikiError, HibikiResult};
use crate::http::{ChunkType, ConnectionManager, DownloadRateObserver};
use crate::keyring::{decrypt_aes128, Keyring};
use crate::logic::{create_logic, AdaptationLogic, BufferingLogic, StreamId};
use crate::options::StreamingOptions;
use crate::playlist::{EncryptionMethod, Playlist, RepresentationKey, SplitPoint};
use crate::stream::{Stream, StreamChunk};
use crate::time::{now_ticks, Tick, TICKS_PER_SECOND};

/// Turns fetched manifest bodies into the object model. The format-specific
/// parser plugs in here.
pub trait ManifestParser: Send + Sync + 'static {
    fn parse(&self, url: &Url, body: &[u8]) -> HibikiResult<Playlist>;

    /// Parse a fetched segment index into split points. Formats without
    /// indexed single-segment addressing keep the default.
    fn parse_index(&self, url: &Url, _body: &[u8]) -> HibikiResult<Vec<SplitPoint>> {
        Err(HibikiError::PlaylistError(format!(
            "no index parser for {url}"
        )))
    }
}

type SharedLogic = Arc<StdMutex<Box<dyn AdaptationLogic>>>;

fn lock_logic(logic: &SharedLogic) -> MutexGuard<'_, Box<dyn AdaptationLogic>> {
    logic.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forwards transfer rate samples into the adaptation logic.
struct LogicRateObserver {
    logic: SharedLogic,
}

impl DownloadRateObserver for LogicRateObserver {
    fn update_download_rate(&self, id: StreamId, bytes: usize, elapsed: Tick, latency: Tick) {
        lock_logic(&self.logic).update_download_rate(id, bytes, elapsed, latency);
    }
}

/// Never poll a live manifest faster than this.
const REFRESH_FLOOR: Duration = Duration::from_secs(1);
const CHUNK_CHANNEL_DEPTH: usize = 8;

pub struct PlaylistManager<P: ManifestParser> {
    playlist: Arc<Mutex<Playlist>>,
    parser: Arc<P>,
    connections: Arc<ConnectionManager>,
    keyring: Arc<Keyring>,
    logic: SharedLogic,
    buffering: Arc<BufferingLogic>,
    cancel: CancellationToken,
    next_stream_id: StreamId,
}

impl<P: ManifestParser> PlaylistManager<P> {
    pub fn new(playlist: Playlist, parser: P, options: &StreamingOptions) -> HibikiResult<Self> {
        let connections = Arc::new(ConnectionManager::new(options)?);
        let logic: SharedLogic = Arc::new(StdMutex::new(create_logic(options)));
        connections.set_rate_observer(Arc::new(LogicRateObserver {
            logic: logic.clone(),
        }));
        Ok(Self {
            playlist: Arc::new(Mutex::new(playlist)),
            parser: Arc::new(parser),
            connections,
            keyring: Arc::new(Keyring::new()),
            logic,
            buffering: Arc::new(BufferingLogic::from_options(options)),
            cancel: CancellationToken::new(),
            next_stream_id: 0,
        })
    }

    pub fn playlist(&self) -> Arc<Mutex<Playlist>> {
        self.playlist.clone()
    }

    pub fn keyring(&self) -> Arc<Keyring> {
        self.keyring.clone()
    }

    pub fn connections(&self) -> Arc<ConnectionManager> {
        self.connections.clone()
    }

    /// Start progressing the stream that `key`'s adaptation set describes.
    /// Chunks arrive on the returned receiver in playback order; the
    /// channel closing cleanly means end of stream.
    pub async fn start_stream(
        &mut self,
        key: RepresentationKey,
    ) -> HibikiResult<(StreamId, mpsc::Receiver<HibikiResult<StreamChunk>>)> {
        let id = self.next_stream_id;
        self.next_stream_id += 1;

        let start_sequence = {
            let playlist = self.playlist.lock().await;
            playlist
                .representation(key)
                .ok_or_else(|| {
                    HibikiError::PlaylistError(format!("no representation at {key:?}"))
                })?;
            self.buffering.start_segment_number(&playlist, key, now_ticks())
        };
        tracing::debug!(stream = id, start = start_sequence, "starting stream");

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_DEPTH);
        let task = StreamTask {
            stream: Stream::new(id, key, start_sequence),
            playlist: self.playlist.clone(),
            parser: self.parser.clone(),
            connections: self.connections.clone(),
            keyring: self.keyring.clone(),
            logic: self.logic.clone(),
            buffering: self.buffering.clone(),
            cancel: self.cancel.child_token(),
            queued_media: 0,
            playback_epoch: None,
            next_refresh: Instant::now(),
        };
        tokio::spawn(task.run(tx));
        Ok((id, rx))
    }

    /// Stop every stream task and drop pooled connections.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.connections.close_all_connections();
    }
}

struct StreamTask<P: ManifestParser> {
    stream: Stream,
    playlist: Arc<Mutex<Playlist>>,
    parser: Arc<P>,
    connections: Arc<ConnectionManager>,
    keyring: Arc<Keyring>,
    logic: SharedLogic,
    buffering: Arc<BufferingLogic>,
    cancel: CancellationToken,
    /// Total duration of media delivered downstream.
    queued_media: Tick,
    /// When the synthetic playback clock started running.
    playback_epoch: Option<Instant>,
    next_refresh: Instant,
}

enum Step {
    Delivered,
    Waiting(Duration),
    Finished,
}

impl<P: ManifestParser> StreamTask<P> {
    async fn run(mut self, tx: mpsc::Sender<HibikiResult<StreamChunk>>) {
        loop {
            if self.cancel.is_cancelled() || tx.is_closed() {
                return;
            }
            match self.step(&tx).await {
                Ok(Step::Delivered) => {}
                Ok(Step::Waiting(pause)) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                Ok(Step::Finished) => {
                    tracing::debug!(stream = self.stream.id(), "end of stream");
                    return;
                }
                Err(error) => {
                    tracing::error!(stream = self.stream.id(), "stream failed: {error}");
                    let _ = tx.send(Err(error)).await;
                    return;
                }
            }
        }
    }

    async fn step(&mut self, tx: &mpsc::Sender<HibikiResult<StreamChunk>>) -> HibikiResult<Step> {
        self.maybe_refresh().await?;
        self.adapt().await?;

        if self.stream.needs_init() {
            self.prepare_index().await?;
            if let Some(chunk) = self.fetch_init().await? {
                if tx.send(Ok(chunk)).await.is_err() {
                    return Ok(Step::Finished);
                }
            }
            self.stream.mark_init_sent();
        }

        // snapshot everything the fetch needs, then release the playlist
        let (segment, actual, gap, url, encryption, format, is_live) = {
            let playlist = self.playlist.lock().await;
            let key = self.stream.representation();
            match playlist.next_media_segment(key, self.stream.next_sequence()) {
                Some((segment, actual, gap)) => {
                    let url = match segment.url.as_deref() {
                        Some(target) => playlist.resolve_url(key, target)?,
                        None => {
                            return Err(HibikiError::PlaylistError(format!(
                                "segment {actual} has no address"
                            )))
                        }
                    };
                    let encryption = playlist.encryption(key).cloned();
                    let format = playlist
                        .representation(key)
                        .map(|r| r.format)
                        .unwrap_or_default();
                    (segment, actual, gap, url, encryption, format, playlist.props.is_live)
                }
                None => {
                    if playlist.needs_updates() {
                        // live edge reached, wait for the window to move
                        return Ok(Step::Waiting(self.refresh_interval(&playlist)));
                    }
                    return Ok(Step::Finished);
                }
            }
        };

        let source = self.connections.make_source(
            url,
            self.stream.id(),
            ChunkType::Media,
            segment.byte_range.clone(),
        )?;
        self.connections.start(&source);
        let body = match source.read_all().await {
            Ok(body) => body,
            Err(error) => {
                let exhausted = {
                    let mut playlist = self.playlist.lock().await;
                    playlist
                        .representation_mut(self.stream.representation())
                        .map(|rep| rep.record_failure())
                        .unwrap_or(true)
                };
                tracing::warn!(
                    stream = self.stream.id(),
                    sequence = actual,
                    "segment fetch failed: {error}"
                );
                if exhausted {
                    // budget spent: go straight back to adapt, which either
                    // switches away or reports NoUsableRepresentation
                    return Ok(Step::Delivered);
                }
                return Ok(Step::Waiting(REFRESH_FLOOR));
            }
        };

        let data = match &encryption {
            Some(enc) if enc.method == EncryptionMethod::Aes128 => {
                let key_uri = enc
                    .key_uri
                    .as_deref()
                    .ok_or(HibikiError::DecryptionKeyRequired)?;
                let key_url = Url::parse(key_uri)?;
                let key = self
                    .keyring
                    .get_key(&self.connections, self.stream.id(), &key_url)
                    .await?;
                let iv = enc.effective_iv(actual);
                bytes::Bytes::from(decrypt_aes128(&body, &key, &iv)?)
            }
            _ => body,
        };

        let disco_changed = self
            .stream
            .advance(actual, segment.discontinuity_sequence);
        self.stream.set_format(format);

        let duration = {
            let mut playlist = self.playlist.lock().await;
            if let Some(rep) = playlist.representation_mut(self.stream.representation()) {
                rep.record_success();
            }
            playlist
                .playback_time_duration(self.stream.representation(), actual)
                .map(|(_, d)| d)
                .unwrap_or(0)
        };
        let chunk = StreamChunk {
            stream_id: self.stream.id(),
            sequence: actual,
            format,
            is_init: false,
            discontinuity: segment.discontinuity || disco_changed || gap,
            display_time: segment.display_time,
            duration,
            data,
        };
        if tx.send(Ok(chunk)).await.is_err() {
            return Ok(Step::Finished);
        }

        self.queued_media += duration;
        if is_live {
            let mut playlist = self.playlist.lock().await;
            playlist.prune_by_sequence(self.stream.representation(), actual);
        }
        self.pace().await;
        Ok(Step::Delivered)
    }

    /// Pick the representation for the next download and note the switch.
    /// Fails once every representation in the set spent its failure budget.
    async fn adapt(&mut self) -> HibikiResult<()> {
        let playlist = self.playlist.lock().await;
        let key = self.stream.representation();
        let Some(set) = playlist.adaptation_set(key) else {
            return Ok(());
        };
        if !set.representations().iter().any(|r| r.is_usable()) {
            return Err(HibikiError::NoUsableRepresentation);
        }
        let current = key.representation;
        let current_usable = set
            .representations()
            .get(current)
            .is_some_and(|r| r.is_usable());
        let picked = lock_logic(&self.logic).next_representation(
            self.stream.id(),
            set,
            current_usable.then_some(current),
        );
        let Some(picked) = picked else {
            return Ok(());
        };
        if picked != current {
            let old_bps = set.representations().get(current).map(|r| r.bandwidth);
            let new_bps = set.representations()[picked].bandwidth;
            tracing::info!(
                stream = self.stream.id(),
                from = old_bps,
                to = new_bps,
                "switching representation"
            );
            lock_logic(&self.logic).on_representation_switch(
                self.stream.id(),
                old_bps,
                new_bps,
            );
            self.stream.switch_representation(RepresentationKey {
                representation: picked,
                ..key
            });
        }
        Ok(())
    }

    /// Fetch and apply the segment index when the representation addresses
    /// its media through a single indexed segment.
    async fn prepare_index(&mut self) -> HibikiResult<()> {
        let pending = {
            let playlist = self.playlist.lock().await;
            let key = self.stream.representation();
            match playlist.pending_index(key) {
                Some(index) => {
                    let url = playlist.resolve_url(key, &index.url)?;
                    Some((url, index.byte_range))
                }
                None => None,
            }
        };
        let Some((url, byte_range)) = pending else {
            return Ok(());
        };

        let source = self.connections.make_source(
            url.clone(),
            self.stream.id(),
            ChunkType::Index,
            byte_range,
        )?;
        self.connections.start(&source);
        let body = source.read_all().await?;
        self.connections.recycle_source(&source);

        let points = self.parser.parse_index(&url, &body)?;
        let mut playlist = self.playlist.lock().await;
        playlist.split_using_index(self.stream.representation(), &points);
        Ok(())
    }

    async fn fetch_init(&mut self) -> HibikiResult<Option<StreamChunk>> {
        let (init, format) = {
            let playlist = self.playlist.lock().await;
            let key = self.stream.representation();
            let format = playlist
                .representation(key)
                .map(|r| r.format)
                .unwrap_or_default();
            match playlist.init_segment(key) {
                Some(init) => {
                    let url = playlist.resolve_url(key, &init.url)?;
                    (Some((url, init.byte_range)), format)
                }
                None => (None, format),
            }
        };
        let Some((url, byte_range)) = init else {
            return Ok(None);
        };

        let source =
            self.connections
                .make_source(url, self.stream.id(), ChunkType::Init, byte_range)?;
        self.connections.start(&source);
        let data = source.read_all().await?;
        self.connections.recycle_source(&source);
        Ok(Some(StreamChunk {
            stream_id: self.stream.id(),
            sequence: self.stream.next_sequence(),
            format,
            is_init: true,
            discontinuity: false,
            display_time: None,
            duration: 0,
            data,
        }))
    }

    /// Refresh the manifest when live playback is due for one, keeping the
    /// last good playlist on failure until the failure budget is spent.
    async fn maybe_refresh(&mut self) -> HibikiResult<()> {
        let (due, url) = {
            let playlist = self.playlist.lock().await;
            if !playlist.needs_updates() {
                return Ok(());
            }
            let starving = playlist
                .min_ahead_time(self.stream.representation(), self.stream.next_sequence())
                < TICKS_PER_SECOND;
            let due = starving || Instant::now() >= self.next_refresh;
            (due, playlist.props.url.clone())
        };
        if !due {
            return Ok(());
        }
        let Some(url) = url else {
            return Ok(());
        };

        let result = self.fetch_manifest(&url).await;
        let mut playlist = self.playlist.lock().await;
        match result {
            Ok(updated) => {
                playlist.update_with(updated);
                self.next_refresh = Instant::now() + self.refresh_interval(&playlist);
                Ok(())
            }
            Err(error) => {
                tracing::warn!("manifest refresh failed: {error}");
                self.next_refresh = Instant::now() + REFRESH_FLOOR;
                // CanNoLongerUpdate once the budget is spent
                playlist.mark_update_failure()
            }
        }
    }

    async fn fetch_manifest(&self, url: &Url) -> HibikiResult<Playlist> {
        let source = self.connections.make_source(
            url.clone(),
            self.stream.id(),
            ChunkType::Playlist,
            None,
        )?;
        self.connections.start(&source);
        let body = source.read_all().await?;
        self.parser.parse(url, &body)
    }

    fn refresh_interval(&self, playlist: &Playlist) -> Duration {
        let period = playlist
            .props
            .minimum_update_period
            .filter(|p| *p > 0)
            .or(playlist.props.max_segment_duration)
            .unwrap_or(TICKS_PER_SECOND * 2);
        Duration::from_micros(period as u64).max(REFRESH_FLOOR)
    }

    /// Hold off further downloads while the buffer sits at its target.
    async fn pace(&mut self) {
        let (min_target, max_target) = {
            let playlist = self.playlist.lock().await;
            (
                self.buffering.min_buffering(&playlist.props),
                self.buffering.max_buffering(&playlist.props),
            )
        };

        if self.playback_epoch.is_none() && self.queued_media >= min_target {
            self.playback_epoch = Some(Instant::now());
        }
        let level = match self.playback_epoch {
            Some(epoch) => self.queued_media - epoch.elapsed().as_micros() as Tick,
            None => self.queued_media,
        };
        lock_logic(&self.logic).on_buffering_update(
            self.stream.id(),
            min_target,
            level.max(0),
            max_target,
        );

        if level > max_target {
            let overshoot = Duration::from_micros((level - max_target) as u64);
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(overshoot) => {}
            }
        }
    }
}
