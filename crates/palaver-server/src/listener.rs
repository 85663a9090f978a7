//! TCP acceptance loop.
//!
//! Accepts connections until shutdown is signalled and spawns one session
//! task per connection. An accept failure is logged and survived; binding
//! the listener is the caller's job, because a bind failure is the one
//! startup error that aborts the server.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use palaver_shared::constants::SERVER_SENDER;
use palaver_shared::{Frame, MessageKind};

use crate::config::ServerConfig;
use crate::peer::PeerHandle;
use crate::router::{wire_timestamp, Router};
use crate::session::Session;

pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        addr = %config.listen_addr,
        max_clients = config.max_clients,
        "Relay accepting connections"
    );

    let permits = Arc::new(Semaphore::new(config.max_clients));

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.changed() => {
                info!("No longer accepting connections");
                return;
            }
        };

        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(error) => {
                warn!(%error, "Failed to accept connection");
                continue;
            }
        };

        debug!(%addr, "New client connection");

        let (read_half, write_half) = stream.into_split();
        let mut handle = PeerHandle::new(Box::new(write_half));

        // Connection ceiling: turn the client away before registration.
        let Ok(permit) = permits.clone().try_acquire_owned() else {
            warn!(%addr, ceiling = config.max_clients, "Connection ceiling reached, turning client away");
            let frame = Frame::new(
                MessageKind::Error,
                SERVER_SENDER,
                "Server is full, try again later",
                wire_timestamp(),
            );
            let _ = handle.send(&frame).await;
            handle.close().await;
            continue;
        };

        let session = Session::new(read_half, router.clone(), shutdown.clone());
        tokio::spawn(async move {
            session.run(handle).await;
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;

    struct TestServer {
        addr: SocketAddr,
        router: Router,
        shutdown: watch::Sender<bool>,
    }

    async fn start_server(max_clients: usize) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new();
        let (shutdown, rx) = watch::channel(false);
        let config = ServerConfig {
            listen_addr: addr,
            max_clients,
        };
        tokio::spawn(serve(listener, config, router.clone(), rx));
        TestServer {
            addr,
            router,
            shutdown,
        }
    }

    struct TestClient {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read, writer) = stream.into_split();
            Self {
                lines: BufReader::new(read).lines(),
                writer,
            }
        }

        async fn send_line(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn read_frame(&mut self) -> Frame {
            let line = tokio::time::timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .expect("timed out waiting for a frame")
                .unwrap()
                .expect("server closed the connection");
            Frame::decode(&line).unwrap()
        }

        async fn read_eof(&mut self) {
            loop {
                match tokio::time::timeout(Duration::from_secs(2), self.lines.next_line())
                    .await
                    .expect("timed out waiting for EOF")
                {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => return,
                }
            }
        }

        async fn join(addr: SocketAddr, name: &str) -> Self {
            let mut client = Self::connect(addr).await;
            client.send_line(name).await;
            for _ in 0..3 {
                client.read_frame().await;
            }
            client
        }
    }

    #[tokio::test]
    async fn test_end_to_end_chat_flow() {
        let server = start_server(8).await;

        let mut alice = TestClient::join(server.addr, "Alice").await;
        let mut bob = TestClient::join(server.addr, "Bob").await;

        let notice = alice.read_frame().await;
        assert_eq!(notice.kind, MessageKind::UserJoin);
        assert_eq!(notice.content, "Bob joined the chat");

        alice.send_line("CHAT_MESSAGE||hello everyone|00:00:00").await;
        for client in [&mut alice, &mut bob] {
            let chat = client.read_frame().await;
            assert_eq!(chat.kind, MessageKind::Chat);
            assert_eq!(chat.sender, "Alice");
            assert_eq!(chat.content, "hello everyone");
        }

        alice.send_line("PRIVATE|Bob|psst|00:00:00").await;
        let private = bob.read_frame().await;
        assert_eq!(private.kind, MessageKind::Private);
        assert_eq!(private.sender, "[Private] Alice");
        assert_eq!(private.content, "psst");
        let confirm = alice.read_frame().await;
        assert_eq!(confirm.kind, MessageKind::Server);
        assert_eq!(confirm.content, "Private message sent to Bob");

        // Bob hangs up; Alice hears about it.
        drop(bob);
        let leave = alice.read_frame().await;
        assert_eq!(leave.kind, MessageKind::UserLeave);
        assert_eq!(leave.content, "Bob left the chat");
        assert_eq!(server.router.online_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_over_tcp() {
        let server = start_server(8).await;

        let _alice = TestClient::join(server.addr, "Alice").await;

        let mut imposter = TestClient::connect(server.addr).await;
        imposter.send_line("Alice").await;
        let reply = imposter.read_frame().await;
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.content, "Name 'Alice' is already taken");

        imposter.send_line("Bob").await;
        let welcome = imposter.read_frame().await;
        assert_eq!(welcome.kind, MessageKind::Welcome);
        assert_eq!(server.router.online_count().await, 2);
    }

    #[tokio::test]
    async fn test_connection_ceiling() {
        let server = start_server(1).await;

        let _alice = TestClient::join(server.addr, "Alice").await;

        let mut rejected = TestClient::connect(server.addr).await;
        let reply = rejected.read_frame().await;
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.content, "Server is full, try again later");
        rejected.read_eof().await;
        assert_eq!(server.router.online_count().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let server = start_server(8).await;

        let mut alice = TestClient::join(server.addr, "Alice").await;
        server.shutdown.send(true).unwrap();

        // The session observes the signal, runs teardown, and the socket
        // closes; any departure notices in flight are drained first.
        alice.read_eof().await;
        assert_eq!(server.router.online_count().await, 0);
    }
}
