//! Join, leave, broadcast, and private-send against the registry.
//!
//! Every operation acquires the one mutex guarding the registry and does
//! all of its registry mutation *and* all of its sink writes while holding
//! it. That single exclusion domain is what gives every observer one
//! global order over joins, leaves, and messages; per-peer ordering alone
//! would not. The flip side, accepted by design, is that a stalled sink
//! stalls the broadcast path for everyone until the write completes or
//! fails.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use palaver_shared::constants::{SERVER_SENDER, TIMESTAMP_FORMAT};
use palaver_shared::{Frame, MessageKind};

use crate::error::RoutingError;
use crate::peer::PeerHandle;
use crate::registry::Registry;

/// Result of a join attempt.
///
/// A refused join hands the peer handle back so the session can keep
/// talking to the client and let it retry under another name.
pub enum JoinOutcome {
    Welcomed,
    NameTaken(PeerHandle),
}

/// Wall-clock timestamp in the wire format (`HH:mm:ss`, server-local),
/// stamped at the moment a record is constructed.
pub(crate) fn wire_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// The routing authority. Cheap to clone; all clones share one registry
/// and one lock.
#[derive(Clone, Default)]
pub struct Router {
    registry: Arc<Mutex<Registry>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    /// Register `name` and announce the arrival.
    ///
    /// On success the newcomer receives a WELCOME record and the current
    /// user list, then every registered peer (the newcomer included)
    /// receives the join notice. On a name conflict nothing is sent or
    /// broadcast and the handle travels back to the caller.
    pub async fn join(&self, name: &str, handle: PeerHandle) -> JoinOutcome {
        let mut registry = self.registry.lock().await;

        if let Err(handle) = registry.register(name, handle) {
            debug!(user = %name, "Join refused, name already taken");
            return JoinOutcome::NameTaken(handle);
        }

        // Greet the newcomer before the join notice goes out.
        let ts = wire_timestamp();
        let welcome = Frame::new(
            MessageKind::Welcome,
            SERVER_SENDER,
            format!("Welcome to the chat, {}!", name),
            ts.clone(),
        );
        let user_list = Frame::new(
            MessageKind::UserList,
            SERVER_SENDER,
            user_list_content(&registry),
            ts,
        );

        let mut dead = Vec::new();
        if let Some(peer) = registry.get_mut(name) {
            if peer.send(&welcome).await.is_err() || peer.send(&user_list).await.is_err() {
                warn!(user = %name, "Greeting failed, scheduling removal");
                dead.push(name.to_string());
            }
        }

        let notice = Frame::new(
            MessageKind::UserJoin,
            SERVER_SENDER,
            format!("{} joined the chat", name),
            wire_timestamp(),
        );
        dead.extend(deliver_to_all(&mut registry, &notice).await);

        info!(user = %name, online = registry.len(), "User joined the chat");

        remove_peers(&mut registry, dead).await;
        JoinOutcome::Welcomed
    }

    /// Drop `name` from the registry and, if it was present, tell the
    /// remaining peers. Calling it again for the same name is a no-op.
    pub async fn leave(&self, name: &str) {
        let mut registry = self.registry.lock().await;
        remove_peers(&mut registry, vec![name.to_string()]).await;
    }

    /// Deliver one record to every registered peer.
    ///
    /// Delivery is best-effort per peer: a failed sink never aborts the
    /// sweep, it schedules that peer's removal once the sweep has visited
    /// everyone in the snapshot taken at call time.
    pub async fn broadcast(&self, sender: &str, content: &str, kind: MessageKind) {
        let mut registry = self.registry.lock().await;

        let frame = Frame::new(kind, sender, content, wire_timestamp());
        let dead = deliver_to_all(&mut registry, &frame).await;

        if kind == MessageKind::Chat {
            debug!(user = %sender, "Broadcast chat message");
        }

        remove_peers(&mut registry, dead).await;
    }

    /// Deliver a direct message.
    ///
    /// The recipient gets the PRIVATE record and the sender a SERVER
    /// confirmation; an unknown recipient earns the sender an ERROR record
    /// instead. Nothing is ever broadcast, and a sender that disconnected
    /// mid-operation is skipped silently.
    pub async fn private_send(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Result<(), RoutingError> {
        let mut registry = self.registry.lock().await;
        let ts = wire_timestamp();
        let mut dead = Vec::new();

        if !registry.contains(recipient) {
            let error = RoutingError::RecipientNotFound(recipient.to_string());
            let reply = Frame::new(MessageKind::Error, SERVER_SENDER, error.to_string(), ts);
            if let Some(peer) = registry.get_mut(sender) {
                if peer.send(&reply).await.is_err() {
                    dead.push(sender.to_string());
                }
            }
            remove_peers(&mut registry, dead).await;
            return Err(error);
        }

        let private = Frame::new(
            MessageKind::Private,
            format!("[Private] {}", sender),
            content,
            ts.clone(),
        );
        if let Some(peer) = registry.get_mut(recipient) {
            if peer.send(&private).await.is_err() {
                dead.push(recipient.to_string());
            }
        }

        let confirm = Frame::new(
            MessageKind::Server,
            SERVER_SENDER,
            format!("Private message sent to {}", recipient),
            ts,
        );
        if let Some(peer) = registry.get_mut(sender) {
            if peer.send(&confirm).await.is_err() {
                dead.push(sender.to_string());
            }
        }

        debug!(from = %sender, to = %recipient, "Relayed private message");
        remove_peers(&mut registry, dead).await;
        Ok(())
    }

    /// Address one SERVER-originated record to a single registered peer.
    ///
    /// Used for per-session notices once the peer's sink lives in the
    /// registry. A dead sink schedules the usual removal.
    pub async fn notify(&self, name: &str, kind: MessageKind, content: &str) {
        let mut registry = self.registry.lock().await;

        let frame = Frame::new(kind, SERVER_SENDER, content, wire_timestamp());
        let mut dead = Vec::new();
        if let Some(peer) = registry.get_mut(name) {
            if peer.send(&frame).await.is_err() {
                dead.push(name.to_string());
            }
        }
        remove_peers(&mut registry, dead).await;
    }

    /// Names currently online (point-in-time copy).
    pub async fn online_names(&self) -> Vec<String> {
        self.registry.lock().await.names()
    }

    /// Number of connected users.
    pub async fn online_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}

/// The USER_LIST content a newcomer receives: comma-joined names, no
/// trailing separator.
fn user_list_content(registry: &Registry) -> String {
    debug_assert!(!registry.is_empty());
    format!("Online users: {}", registry.names().join(", "))
}

/// Deliver one frame to every registered peer, in snapshot order.
///
/// Returns the names whose sinks failed; the caller removes them after the
/// sweep, never from the map being iterated.
async fn deliver_to_all(registry: &mut Registry, frame: &Frame) -> Vec<String> {
    let mut dead = Vec::new();
    for name in registry.names() {
        if let Some(peer) = registry.get_mut(&name) {
            if let Err(error) = peer.send(frame).await {
                warn!(user = %name, %error, "Write to peer failed, scheduling removal");
                dead.push(name);
            }
        }
    }
    dead
}

/// Remove the named peers, announcing each departure to the survivors.
///
/// A departure notice can itself hit a dead sink, so the sweep continues
/// until no removal produces a new failure. Names already gone are
/// skipped, which keeps teardown idempotent. Must run under the same lock
/// acquisition as the operation that found the dead peers.
async fn remove_peers(registry: &mut Registry, mut doomed: Vec<String>) {
    while let Some(name) = doomed.pop() {
        let Some(mut handle) = registry.unregister(&name) else {
            continue;
        };
        debug_assert_eq!(handle.name(), Some(name.as_str()));
        if handle.is_alive() {
            handle.close().await;
        }
        info!(user = %name, online = registry.len(), "User left the chat");

        let notice = Frame::new(
            MessageKind::UserLeave,
            SERVER_SENDER,
            format!("{} left the chat", name),
            wire_timestamp(),
        );
        doomed.extend(deliver_to_all(registry, &notice).await);
    }
}
