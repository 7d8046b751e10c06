//! Download queues.
//!
//! One worker task per queue, transfers processed in FIFO order. Media
//! segments go through the normal queue; everything the player blocks on
//! (init, index, playlist, key) rides a second queue so a long segment
//! transfer cannot delay them.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::{HibikiError, HibikiResult};
use crate::http::chunk::ChunkSource;
use crate::http::connection::{ConnectionParams, RequestStatus, MAX_REDIRECTS};
use crate::http::ManagerCore;
use crate::time::Tick;

pub(crate) struct Downloader {
    jobs: mpsc::UnboundedSender<ChunkSource>,
}

impl Downloader {
    pub(crate) fn spawn(name: &'static str, core: Arc<ManagerCore>) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<ChunkSource>();
        tokio::spawn(async move {
            while let Some(chunk) = queue.recv().await {
                if chunk.is_cancelled() {
                    continue;
                }
                process(&core, &chunk).await;
            }
            tracing::debug!("{name} download queue closed");
        });
        Self { jobs }
    }

    pub(crate) fn schedule(&self, chunk: ChunkSource) {
        if self.jobs.send(chunk).is_err() {
            tracing::error!("download queue worker is gone");
        }
    }
}

async fn process(core: &ManagerCore, chunk: &ChunkSource) {
    let started = Instant::now();
    match transfer(core, chunk, started).await {
        Ok(latency) => {
            chunk.finish();
            let elapsed = started.elapsed().as_micros() as Tick;
            // exactly one rate sample per completed chunk
            core.report_rate(chunk.stream_id(), chunk.total_bytes(), elapsed, latency);
            tracing::trace!(
                url = %chunk.url(),
                bytes = chunk.total_bytes(),
                elapsed_us = elapsed,
                "transfer complete"
            );
        }
        Err(HibikiError::Canceled) => {
            // canceled transfers produce no rate sample
            chunk.fail(HibikiError::Canceled);
        }
        Err(error) => {
            tracing::warn!(url = %chunk.url(), "transfer failed: {error}");
            chunk.fail(error);
        }
    }
}

/// Run the transfer, following up to [`MAX_REDIRECTS`] redirects by hand.
/// Returns the time to response headers of the final hop.
async fn transfer(core: &ManagerCore, chunk: &ChunkSource, started: Instant) -> HibikiResult<Tick> {
    let mut url = chunk.url().clone();
    for _ in 0..=MAX_REDIRECTS {
        let params = ConnectionParams::new(url.clone());
        let mut connection = core.acquire(&params)?;

        let request = connection.request(&url, chunk.range());
        let status = match core.request_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, request)
                .await
                .map_err(|_| HibikiError::Timeout)??,
            None => request.await?,
        };

        match status {
            RequestStatus::Success => {
                chunk.set_content_length(connection.content_length());
                let latency = started.elapsed().as_micros() as Tick;
                loop {
                    tokio::select! {
                        _ = chunk.cancellation_token().cancelled() => {
                            core.release(connection);
                            return Err(HibikiError::Canceled);
                        }
                        block = connection.read_chunk() => match block? {
                            Some(bytes) => chunk.push(bytes),
                            None => {
                                core.release(connection);
                                return Ok(latency);
                            }
                        }
                    }
                }
            }
            RequestStatus::Redirection => {
                let Some(next) = connection.redirection().cloned() else {
                    return Err(HibikiError::RequestFailed(RequestStatus::Redirection));
                };
                core.release(connection);
                tracing::debug!(from = %url, to = %next, "following redirect");
                url = next;
            }
            failed => {
                core.release(connection);
                return Err(HibikiError::RequestFailed(failed));
            }
        }
    }
    Err(HibikiError::TooManyRedirects(MAX_REDIRECTS))
}
