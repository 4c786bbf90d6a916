//! Append-only event output.
//!
//! Events from concurrently running tasks are funneled through a channel to a
//! single writer, so output lines from different probes never interleave.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::OutputEvent;

/// Destination for rendered event lines.
#[async_trait]
pub trait EventWriter: Send {
    async fn write_line(&mut self, line: &str);
}

/// Writes events to stdout, flushing per line so followers see them promptly.
pub struct StdoutWriter {
    out: tokio::io::Stdout,
}

impl StdoutWriter {
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventWriter for StdoutWriter {
    async fn write_line(&mut self, line: &str) {
        // one write per whole line keeps records intact
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        if self.out.write_all(&buf).await.is_ok() {
            let _ = self.out.flush().await;
        }
    }
}

/// Clonable emission handle shared by the poller and every probe.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl EventSink {
    /// Sink draining to stdout. The writer task ends once every sink clone
    /// has been dropped and the queue is empty.
    pub fn stdout() -> (Self, JoinHandle<()>) {
        Self::with_writer(StdoutWriter::new())
    }

    /// Sink draining to an arbitrary writer.
    pub fn with_writer(mut writer: impl EventWriter + 'static) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutputEvent>();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                writer.write_line(&event.to_csv()).await;
            }
        });
        (Self { tx }, handle)
    }

    /// Sink handing raw events to the caller instead of rendering them.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit one event. Silently dropped if the writer has gone away.
    pub fn emit(&self, event: OutputEvent) {
        let _ = self.tx.send(event);
    }
}
