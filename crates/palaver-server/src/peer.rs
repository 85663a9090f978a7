//! Outbound write path for one connected client.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use palaver_shared::Frame;

/// Type-erased outbound byte sink.
///
/// The live server hands in the write half of a TCP stream; tests hand in
/// one end of a duplex pipe.
pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// One connected, possibly-named client and its outbound write path.
///
/// A handle is created at accept time, before any name is known. It is
/// owned by its session until registration succeeds, then moves into the
/// registry; unregistration hands it back to the router for closing.
pub struct PeerHandle {
    name: Option<String>,
    sink: Sink,
    alive: bool,
}

impl PeerHandle {
    pub fn new(sink: Sink) -> Self {
        Self {
            name: None,
            sink,
            alive: true,
        }
    }

    /// The registered display name, if one has been bound.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Bind the display name. Happens exactly once, at registration.
    pub(crate) fn bind_name(&mut self, name: &str) {
        debug_assert!(self.name.is_none());
        self.name = Some(name.to_string());
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Write one record to the sink as a newline-terminated line.
    ///
    /// A failed write clears the liveness flag; deciding what to do about
    /// the dead peer is the caller's business.
    pub async fn send(&mut self, frame: &Frame) -> std::io::Result<()> {
        if !self.alive {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer handle already closed",
            ));
        }

        let mut line = frame.encode();
        line.push('\n');

        let result = async {
            self.sink.write_all(line.as_bytes()).await?;
            self.sink.flush().await
        }
        .await;

        if result.is_err() {
            self.alive = false;
        }
        result
    }

    /// Close the sink. Safe to call more than once.
    pub async fn close(&mut self) {
        self.alive = false;
        let _ = self.sink.shutdown().await;
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("name", &self.name)
            .field("alive", &self.alive)
            .finish_non_exhaustive()
    }
}
