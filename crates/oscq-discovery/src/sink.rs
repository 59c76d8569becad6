//! Notification sinks for detected port changes

use oscq_core::protocol;
use parking_lot::Mutex;
use std::io::{self, Write};
use tokio::sync::mpsc;
use tracing::warn;

/// Receives "the advertised port changed" notifications.
///
/// Called at most once per change and never concurrently for one listener.
pub trait PortSink: Send + Sync {
    fn announce(&self, port: u16);
}

impl<F> PortSink for F
where
    F: Fn(u16) + Send + Sync,
{
    fn announce(&self, port: u16) {
        self(port)
    }
}

/// Writes `FOUND:<port>` lines and flushes after each one.
pub struct LineSink<W: Write + Send> {
    writer: Mutex<W>,
}

/// Line sink writing to the process stdout
pub type StdoutSink = LineSink<io::Stdout>;

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink and returns the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> PortSink for LineSink<W> {
    fn announce(&self, port: u16) {
        let mut writer = self.writer.lock();
        let written = writeln!(writer, "{}", protocol::format_found(port)).and_then(|_| writer.flush());
        if let Err(e) = written {
            warn!(error = %e, port, "Failed to write port line");
        }
    }
}

/// Native callback signature used across the embedding boundary
pub type PortCallback = extern "C" fn(port: u16);

/// Invokes a native callback with the new port.
pub struct CallbackSink {
    callback: PortCallback,
}

impl CallbackSink {
    pub fn new(callback: PortCallback) -> Self {
        Self { callback }
    }
}

impl PortSink for CallbackSink {
    fn announce(&self, port: u16) {
        (self.callback)(port)
    }
}

/// Forwards ports to an in-process channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<u16>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<u16>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PortSink for ChannelSink {
    fn announce(&self, port: u16) {
        // A receiver that went away means nobody is interested anymore.
        let _ = self.tx.send(port);
    }
}
