//! Per-connection lifecycle: registration, message routing, teardown.
//!
//! A session drives one peer handle through the three connection states:
//! connected (transport open, no name), active (name bound), closed. The
//! reading side lives here; every write to the peer goes through the
//! router once the handle is registered.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::watch;
use tracing::{debug, warn};

use palaver_shared::constants::{FIELD_SEPARATOR, MAX_NAME_LEN, SERVER_SENDER};
use palaver_shared::{Frame, MessageKind};

use crate::error::RoutingError;
use crate::peer::PeerHandle;
use crate::router::{wire_timestamp, JoinOutcome, Router};

#[derive(PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// The lifecycle of one connection from accept to teardown.
pub struct Session<R> {
    lines: Lines<BufReader<R>>,
    router: Router,
    shutdown: watch::Receiver<bool>,
    name: Option<String>,
    closed: bool,
}

impl<R: AsyncRead + Unpin> Session<R> {
    pub fn new(reader: R, router: Router, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            router,
            shutdown,
            name: None,
            closed: false,
        }
    }

    /// Drive the connection from registration to teardown.
    pub async fn run(mut self, handle: PeerHandle) {
        match self.register(handle).await {
            Some(name) => {
                self.name = Some(name.clone());
                self.route(&name).await;
            }
            None => debug!("Connection closed before registration"),
        }
        self.teardown().await;
    }

    /// Registration phase: read display-name attempts until one is
    /// accepted.
    ///
    /// Returns `None` when the transport drops, shutdown is signalled, or
    /// the handle's sink dies before a name is bound. A refused attempt is
    /// answered with an ERROR record and the client may try again.
    async fn register(&mut self, mut handle: PeerHandle) -> Option<String> {
        loop {
            let line = tokio::select! {
                line = self.lines.next_line() => line,
                _ = self.shutdown.changed() => {
                    handle.close().await;
                    return None;
                }
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(error) => {
                    debug!(%error, "Read failed during registration");
                    return None;
                }
            };

            let name = line.trim();
            if let Err(reason) = validate_name(name) {
                if self.refuse(&mut handle, reason).await.is_err() {
                    return None;
                }
                continue;
            }

            match self.router.join(name, handle).await {
                JoinOutcome::Welcomed => return Some(name.to_string()),
                JoinOutcome::NameTaken(returned) => {
                    handle = returned;
                    let reason = RoutingError::NameConflict(name.to_string()).to_string();
                    if self.refuse(&mut handle, reason).await.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Send an ERROR record on the still-session-owned handle.
    async fn refuse(&self, handle: &mut PeerHandle, reason: String) -> std::io::Result<()> {
        let frame = Frame::new(MessageKind::Error, SERVER_SENDER, reason, wire_timestamp());
        handle.send(&frame).await
    }

    /// Active phase: decode inbound frames and hand them to the router
    /// until the transport drops, the client quits, or shutdown is
    /// signalled.
    async fn route(&mut self, name: &str) {
        loop {
            let line = tokio::select! {
                line = self.lines.next_line() => line,
                _ = self.shutdown.changed() => {
                    debug!(user = %name, "Session released by shutdown");
                    return;
                }
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(user = %name, "Client closed the connection");
                    return;
                }
                Err(error) => {
                    warn!(user = %name, %error, "Read failed, closing session");
                    return;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match Frame::decode(&line) {
                Ok(frame) => {
                    if self.dispatch(name, frame).await == Flow::Quit {
                        return;
                    }
                }
                Err(error) => {
                    debug!(user = %name, %error, "Undecodable line from client");
                    self.router
                        .notify(
                            name,
                            MessageKind::Error,
                            &format!("Malformed message: {}", error),
                        )
                        .await;
                }
            }
        }
    }

    async fn dispatch(&mut self, name: &str, frame: Frame) -> Flow {
        match frame.kind {
            MessageKind::Chat => {
                // The bound name wins over whatever the client claimed, and
                // the router stamps its own timestamp.
                self.router
                    .broadcast(name, &frame.content, MessageKind::Chat)
                    .await;
                Flow::Continue
            }
            MessageKind::Private => {
                // On the inbound direction the sender field carries the
                // recipient.
                let recipient = frame.sender.trim().to_string();
                if recipient.is_empty() {
                    self.router
                        .notify(
                            name,
                            MessageKind::Error,
                            "Private message is missing a recipient",
                        )
                        .await;
                } else if let Err(error) =
                    self.router.private_send(name, &recipient, &frame.content).await
                {
                    debug!(user = %name, %error, "Private send refused");
                }
                Flow::Continue
            }
            MessageKind::UserLeave => {
                debug!(user = %name, "Client requested to leave");
                Flow::Quit
            }
            other => {
                self.router
                    .notify(
                        name,
                        MessageKind::Error,
                        &format!("Clients may not send {} records", other),
                    )
                    .await;
                Flow::Continue
            }
        }
    }

    /// Terminal transition. The first call unbinds the name and tells the
    /// router; entering it again is a no-op.
    async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(name) = self.name.take() {
            self.router.leave(&name).await;
        }
    }
}

/// Local display-name validation; failures never reach the router.
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Display name cannot be empty".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!(
            "Display name is limited to {} characters",
            MAX_NAME_LEN
        ));
    }
    if name.contains(FIELD_SEPARATOR) {
        return Err(format!("Display name cannot contain '{}'", FIELD_SEPARATOR));
    }
    if name.eq_ignore_ascii_case(SERVER_SENDER) {
        return Err(format!("'{}' is a reserved name", name));
    }
    Ok(())
}
