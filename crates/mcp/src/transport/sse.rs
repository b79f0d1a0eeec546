// Server-sent events framing and per-connection stream sessions

use super::TransportStats;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const EVENT_ENDPOINT: &str = "endpoint";
pub const EVENT_MESSAGE: &str = "message";

/// One SSE frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `event: <name>` followed by one `data:` line per line of payload
    Event { event: String, data: String },
    /// `: <text>`, ignored by clients
    Comment(String),
}

impl SseFrame {
    pub fn event(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Event {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        Self::Comment(format!(
            "ping - {}",
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        ))
    }

    pub fn encode(&self) -> Bytes {
        let mut out = String::new();
        match self {
            Self::Event { event, data } => {
                out.push_str("event: ");
                out.push_str(event);
                out.push('\n');
                for line in data.split('\n') {
                    out.push_str("data: ");
                    out.push_str(line.trim_end_matches('\r'));
                    out.push('\n');
                }
            }
            Self::Comment(text) => {
                for line in text.split('\n') {
                    out.push_str(": ");
                    out.push_str(line.trim_end_matches('\r'));
                    out.push('\n');
                }
            }
        }
        out.push('\n');
        Bytes::from(out)
    }
}

pub(crate) struct SessionParams {
    pub endpoint_url: String,
    pub heartbeat_interval: Duration,
    pub buffer: usize,
    pub notifications: broadcast::Receiver<String>,
    pub shutdown: CancellationToken,
    pub stats: Arc<TransportStats>,
}

/// Open a stream session and return the body stream that owns it.
///
/// Dropping the returned stream (client disconnect) aborts the session task
/// and with it the heartbeat timer.
pub(crate) fn open_session(params: SessionParams) -> SessionStream {
    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(params.buffer.max(1));
    let stats = params.stats.clone();

    stats.streams_opened.fetch_add(1, Ordering::Relaxed);
    stats.open_streams.fetch_add(1, Ordering::Relaxed);
    tracing::info!(session = %id, "Stream session opened");

    let task = tokio::spawn(run_session(id, tx, params));

    SessionStream {
        rx,
        guard: SessionGuard { id, task, stats },
    }
}

async fn run_session(id: Uuid, tx: mpsc::Sender<Bytes>, params: SessionParams) {
    let SessionParams {
        endpoint_url,
        heartbeat_interval,
        mut notifications,
        shutdown,
        stats,
        ..
    } = params;

    let announce = SseFrame::event(EVENT_ENDPOINT, endpoint_url);
    if tx.send(announce.encode()).await.is_err() {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let (frame, is_heartbeat) = tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tx.closed() => break,
            _ = ticker.tick() => (SseFrame::heartbeat(Utc::now()), true),
            received = notifications.recv() => match received {
                Ok(message) => (SseFrame::event(EVENT_MESSAGE, message), false),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(session = %id, skipped, "Stream session lagged behind notifications");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if tx.send(frame.encode()).await.is_err() {
            break;
        }
        if is_heartbeat {
            stats.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    tracing::debug!(session = %id, "Stream session task finished");
}

struct SessionGuard {
    id: Uuid,
    task: JoinHandle<()>,
    stats: Arc<TransportStats>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.task.abort();
        self.stats.open_streams.fetch_sub(1, Ordering::Relaxed);
        tracing::info!(session = %self.id, "Stream session closed");
    }
}

/// Response body of a streaming connection.
pub struct SessionStream {
    rx: mpsc::Receiver<Bytes>,
    guard: SessionGuard,
}

impl Stream for SessionStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}
