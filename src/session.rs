//! Per-connection session handling
//!
//! Splits the socket into a line reader (driven by the session) and a
//! writer task draining the connection's outbound queue. The session walks
//! Handshake → Active → Closed; teardown runs exactly once on every exit
//! path and the socket closes once the writer has flushed what is queued.

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Peer;
use crate::codec::LineCodec;
use crate::error::RelayError;
use crate::protocol::{is_reserved_name, ClientLine, ServerLine, Target, EVERYONE};
use crate::server::RelayState;
use crate::types::ConnectionId;

/// How long a closing connection gets to flush its outbound backlog
pub const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the nickname line
    Handshake,
    /// Registered and relaying
    Active,
    /// Torn down (terminal)
    Closed,
}

/// Handle a new TCP connection until it ends
///
/// Transport errors end this connection only; they are returned so the
/// caller can log them.
pub async fn handle_connection(
    stream: TcpStream,
    conn_id: ConnectionId,
    state: RelayState,
) -> Result<(), RelayError> {
    let (reader, writer) = stream.into_split();
    let mut lines = FramedRead::new(
        reader,
        LineCodec::with_max_length(state.config.max_line_length),
    );

    let (line_tx, line_rx) = mpsc::channel::<String>(state.config.outbound_capacity());
    let peer = Peer::new(conn_id, line_tx);
    let write_task = tokio::spawn(write_lines(
        FramedWrite::new(writer, LineCodec::new()),
        line_rx,
        conn_id,
        peer.broken_token(),
    ));

    let session = Session::new(peer, state);
    let result = session.run(&mut lines).await;

    // The session (and with it the last queue sender) is gone; the writer
    // flushes the backlog and shuts the socket down.
    finish_writer(write_task, conn_id, WRITER_FLUSH_TIMEOUT).await;
    debug!("Connection {} closed", conn_id);

    result
}

/// Drain the outbound queue into the socket
///
/// Ends when every queue sender is gone (normal close, backlog flushed) or
/// when the peer is marked broken (dropped without flushing).
async fn write_lines(
    mut sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    mut line_rx: mpsc::Receiver<String>,
    conn_id: ConnectionId,
    broken: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            line = line_rx.recv() => line,
            _ = broken.cancelled() => {
                debug!("Dropping backlog for broken connection {}", conn_id);
                break;
            }
        };
        let Some(line) = line else { break };
        if let Err(e) = sink.send(line).await {
            debug!("Write to {} failed: {}", conn_id, e);
            broken.cancel();
            break;
        }
    }
    let _ = sink.close().await;
    debug!("Write task ended for {}", conn_id);
}

/// Wait for the writer to flush, giving up after `grace`
///
/// Returns true if the writer finished on its own.
async fn finish_writer(
    mut write_task: JoinHandle<()>,
    conn_id: ConnectionId,
    grace: Duration,
) -> bool {
    match timeout(grace, &mut write_task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Write task for {} failed: {}", conn_id, e);
            true
        }
        Err(_) => {
            warn!("Write task for {} did not flush within {:?}, aborting", conn_id, grace);
            write_task.abort();
            false
        }
    }
}

/// State of one connected client
pub struct Session {
    /// This connection's own outbound queue
    peer: Peer,
    state: RelayState,
    /// Registered nickname; `None` before the handshake and after teardown
    nickname: Option<String>,
    phase: Phase,
}

impl Session {
    pub fn new(peer: Peer, state: RelayState) -> Self {
        Self {
            peer,
            state,
            nickname: None,
            phase: Phase::Handshake,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Run the session over a stream of decoded lines, then tear down
    ///
    /// Consumes the session: dropping it releases the outbound queue,
    /// which is what closes the connection.
    pub async fn run<S>(mut self, lines: &mut S) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<String, std::io::Error>> + Unpin,
    {
        let result = self.drive(lines).await;
        self.teardown().await;
        result
    }

    async fn drive<S>(&mut self, lines: &mut S) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<String, std::io::Error>> + Unpin,
    {
        let Some(first) = lines.next().await else {
            debug!("Connection {} ended before handshake", self.peer.id);
            return Ok(());
        };
        if !self.handshake(&first?).await {
            return Ok(());
        }

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                _ = self.peer.broken() => {
                    info!("{} fell behind or became unwritable, disconnecting", self.display_name());
                    return Err(RelayError::Unwritable);
                }
            };
            let Some(line) = line else { break };
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match ClientLine::parse(line) {
                Some(ClientLine::Quit) => {
                    info!("{} requested quit", self.display_name());
                    break;
                }
                Some(ClientLine::NameChange { new_name }) => self.change_name(new_name).await,
                Some(ClientLine::Avatar { url }) => self.announce_avatar(url).await,
                Some(ClientLine::Chat {
                    target,
                    msg_id,
                    content,
                }) => self.relay_chat(target, msg_id, content).await,
                None => debug!("Dropping malformed line from {}", self.display_name()),
            }
        }

        Ok(())
    }

    /// Register the nickname from the first line
    ///
    /// Returns false if the connection should be closed.
    async fn handshake(&mut self, line: &str) -> bool {
        let nickname = line.trim();
        if nickname.is_empty() {
            debug!("Empty nickname from {}, closing", self.peer.id);
            return false;
        }

        if is_reserved_name(nickname, &self.state.config.observer_prefix) {
            info!("Rejected reserved nickname '{}'", nickname);
            self.state
                .broadcaster
                .send(&self.peer, &ServerLine::name_taken(nickname));
            return false;
        }

        if let Err(e) = self
            .state
            .registry
            .register(nickname, self.peer.clone())
            .await
        {
            info!("Rejected nickname: {}", e);
            self.state
                .broadcaster
                .send(&self.peer, &ServerLine::name_taken(nickname));
            return false;
        }

        info!("{} joined", nickname);
        self.nickname = Some(nickname.to_string());
        self.phase = Phase::Active;

        let broadcaster = &self.state.broadcaster;
        broadcaster.broadcast_user_list().await;
        broadcaster.broadcast_all(&ServerLine::joined(nickname)).await;
        true
    }

    async fn change_name(&mut self, new_name: String) {
        let Some(old_name) = self.nickname.clone() else {
            return;
        };
        let broadcaster = &self.state.broadcaster;

        if is_reserved_name(&new_name, &self.state.config.observer_prefix) {
            broadcaster.send(&self.peer, &ServerLine::name_taken(&old_name));
            return;
        }

        if let Err(e) = self.state.registry.rename(&old_name, &new_name).await {
            debug!("Rename of '{}' refused: {}", old_name, e);
            broadcaster.send(&self.peer, &ServerLine::name_taken(&old_name));
            return;
        }

        info!("{} is now known as {}", old_name, new_name);
        self.nickname = Some(new_name.clone());

        broadcaster.send(
            &self.peer,
            &ServerLine::Ack {
                old: old_name.clone(),
                new: new_name.clone(),
            },
        );
        broadcaster
            .broadcast_all(&ServerLine::Rename {
                old: old_name.clone(),
                new: new_name.clone(),
            })
            .await;
        broadcaster
            .broadcast_all(&ServerLine::renamed(&old_name, &new_name))
            .await;
        broadcaster.broadcast_user_list().await;
    }

    async fn announce_avatar(&self, url: String) {
        let Some(nickname) = self.nickname.as_deref() else {
            return;
        };
        if url.is_empty() {
            return;
        }
        debug!("{} set avatar {}", nickname, url);
        self.state
            .broadcaster
            .broadcast_all(&ServerLine::Avatar {
                who: nickname.to_string(),
                url,
            })
            .await;
    }

    async fn relay_chat(&self, target: Target, msg_id: String, content: String) {
        let Some(sender) = self.nickname.as_deref() else {
            return;
        };
        let broadcaster = &self.state.broadcaster;

        match target {
            Target::Everyone => {
                let line = ServerLine::Msg {
                    sender: sender.to_string(),
                    target: EVERYONE.to_string(),
                    id: msg_id,
                    content,
                };
                broadcaster.broadcast_all(&line).await;
            }
            Target::User(name) => {
                let Some(recipient) = self.state.registry.lookup(&name).await else {
                    debug!("Dropping message from {} to offline '{}'", sender, name);
                    return;
                };
                let echo = name != sender;
                let line = ServerLine::Msg {
                    sender: sender.to_string(),
                    target: name,
                    id: msg_id,
                    content,
                };
                broadcaster.send_directed(&recipient, &line);
                if echo {
                    broadcaster.send(&self.peer, &line);
                }
            }
        }
    }

    /// Release the nickname and tell everyone
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub async fn teardown(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;

        let broadcaster = &self.state.broadcaster;
        if let Some(nickname) = self.nickname.take() {
            if self.state.registry.remove(&nickname).await {
                info!("{} disconnected", nickname);
                broadcaster
                    .broadcast_all(&ServerLine::disconnected(&nickname))
                    .await;
            }
        }
        broadcaster.broadcast_user_list().await;
    }

    fn display_name(&self) -> String {
        self.nickname
            .clone()
            .unwrap_or_else(|| self.peer.id.to_string())
    }
}
