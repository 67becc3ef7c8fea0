//! Output channels to connected peers.
//!
//! A sink is owned by exactly one connection. The registry hands out shared
//! references so the broadcaster can write to it concurrently with the
//! connection's own heartbeat; each implementation keeps its frames in call order.

use crate::error::{Error, Result, SinkErrorKind};
use crate::message::Frame;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};

pub type Header = (&'static str, &'static str);

#[async_trait]
pub trait Sink: Send + Sync {
    /// Writes the protocol preamble. Called once, before any frame.
    async fn open(&self, headers: &[Header]) -> Result<()>;

    async fn send(&self, frame: &Frame) -> Result<()>;

    /// Resolves once the peer is known to be gone. Sinks that cannot tell
    /// never resolve and rely on a failed write instead.
    async fn closed(&self) {
        futures::future::pending::<()>().await
    }
}

/// Sink feeding an in-process channel, typically drained by an HTTP response body.
///
/// The frame channel is unbounded: `send` never waits, and frames for a slow
/// reader queue in memory until it catches up or its body is dropped. The
/// heartbeat only adds one small frame per interval, so the queue grows with
/// the event rate. Use a `WriterSink` with a write timeout where a slow peer
/// must be cut off instead.
pub struct ChannelSink {
    preamble: StdMutex<Option<oneshot::Sender<Vec<Header>>>>,
    frames: mpsc::UnboundedSender<Bytes>,
}

/// Receiving half of a `ChannelSink`.
pub struct EventStream {
    preamble: Option<oneshot::Receiver<Vec<Header>>>,
    frames: mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelSink {
    pub fn new() -> (Self, EventStream) {
        let (preamble_tx, preamble_rx) = oneshot::channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        (
            Self {
                preamble: StdMutex::new(Some(preamble_tx)),
                frames: frames_tx,
            },
            EventStream {
                preamble: Some(preamble_rx),
                frames: frames_rx,
            },
        )
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn open(&self, headers: &[Header]) -> Result<()> {
        let sender = match self.preamble.lock() {
            Ok(mut preamble) => preamble.take(),
            // A writer panicked mid-open; the stream cannot be trusted.
            Err(_) => return Err(Error::sink(SinkErrorKind::Closed)),
        };
        match sender {
            Some(sender) => sender
                .send(headers.to_vec())
                .map_err(|_| Error::sink(SinkErrorKind::Closed)),
            // Already opened
            None => Ok(()),
        }
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        self.frames
            .send(frame.clone().into_bytes())
            .map_err(|_| Error::sink(SinkErrorKind::Closed))
    }

    async fn closed(&self) {
        self.frames.closed().await
    }
}

impl EventStream {
    /// Waits for the preamble headers. `None` means the connection ended
    /// before it was opened.
    pub async fn preamble(&mut self) -> Option<Vec<Header>> {
        match self.preamble.take() {
            Some(receiver) => receiver.await.ok(),
            None => None,
        }
    }

    pub async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.frames.try_recv().ok()
    }

    /// Frame bytes in write order; ends when the sink is dropped.
    pub fn into_frames(self) -> impl Stream<Item = Bytes> {
        futures::stream::unfold(self.frames, |mut frames| async move {
            frames.recv().await.map(|bytes| (bytes, frames))
        })
    }
}

/// Sink over any async byte writer (socket, pipe, in-memory duplex).
///
/// Writes are serialized by an async mutex, so frames reach the writer in the
/// order `send` was called. Every frame is flushed immediately.
pub struct WriterSink<W> {
    writer: Mutex<W>,
    write_timeout: Option<Duration>,
    http_head: bool,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Frames only; the preamble is the transport's business.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            write_timeout: None,
            http_head: false,
        }
    }

    /// Raw HTTP/1.1 connection: `open` writes the status line and headers.
    pub fn http(writer: W) -> Self {
        Self {
            http_head: true,
            ..Self::new(writer)
        }
    }

    /// Fails writes (including the wait for earlier writes) that take longer than `timeout`.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(bytes).await?;
            writer.flush().await
        };

        let result = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| Error::sink(SinkErrorKind::TimedOut))?,
            None => write.await,
        };
        result.map_err(Error::from)
    }
}

#[async_trait]
impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn open(&self, headers: &[Header]) -> Result<()> {
        if !self.http_head {
            return Ok(());
        }
        let mut head = String::from("HTTP/1.1 200 OK\r\n");
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        self.write(head.as_bytes()).await
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        self.write(frame.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::message::STREAM_HEADERS;
    use futures::StreamExt;
    use serde_json::json;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_channel_sink_hands_over_preamble_and_frames() {
        let (sink, mut stream) = ChannelSink::new();
        sink.open(&STREAM_HEADERS).await.unwrap();
        sink.send(&Frame::comment("hello")).await.unwrap();
        sink.send(&Frame::event("tick", &json!(1)).unwrap())
            .await
            .unwrap();
        drop(sink);

        assert_eq!(stream.preamble().await.unwrap(), STREAM_HEADERS.to_vec());
        let frames: Vec<Bytes> = stream.into_frames().collect().await;
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b": hello\n\n"),
                Bytes::from_static(b"event: tick\ndata: 1\n\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_peer() {
        let (sink, stream) = ChannelSink::new();
        drop(stream);

        let err = sink.send(&Frame::comment("x")).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Sink(SinkErrorKind::Closed));
        // Resolves immediately once the receiver is gone.
        sink.closed().await;
    }

    #[tokio::test]
    async fn test_poisoned_preamble_lock_reports_closed() {
        let (sink, _stream) = ChannelSink::new();
        let sink = std::sync::Arc::new(sink);
        let poisoner = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.preamble.lock().unwrap();
            panic!("poison the preamble lock");
        })
        .join();

        let err = sink.open(&STREAM_HEADERS).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Sink(SinkErrorKind::Closed));
    }

    #[tokio::test]
    async fn test_preamble_is_none_when_sink_dropped_unopened() {
        let (sink, mut stream) = ChannelSink::new();
        drop(sink);
        assert!(stream.preamble().await.is_none());
    }

    #[tokio::test]
    async fn test_writer_sink_writes_http_head_then_frames() {
        let (client, server) = tokio::io::duplex(1024);
        let sink = WriterSink::http(server);
        sink.open(&STREAM_HEADERS).await.unwrap();
        sink.send(&Frame::comment("keepalive")).await.unwrap();
        drop(sink);

        let mut received = String::new();
        let mut client = client;
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(
            received,
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\n\
             connection: keep-alive\r\n\r\n: keepalive\n\n"
        );
    }

    #[tokio::test]
    async fn test_writer_sink_reports_broken_pipe_as_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let sink = WriterSink::new(server);
        let err = sink.send(&Frame::comment("x")).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Sink(SinkErrorKind::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_sink_times_out_on_stalled_peer() {
        // Nobody reads from `_client`, so the 8 byte buffer fills up.
        let (_client, server) = tokio::io::duplex(8);
        let sink = WriterSink::new(server).with_write_timeout(Duration::from_secs(5));
        let err = sink
            .send(&Frame::event("big", &json!({"payload": "0123456789"})).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Sink(SinkErrorKind::TimedOut));
    }
}
