//! TCP server hosting estimation rooms
//!
//! The gateway terminates client connections, binds each one to a
//! participant on join, routes inbound requests to the owning room, and
//! fans canonical snapshots out to every connection bound to that room.
//!
//! Every inbound event takes the state write lock once: validate, mutate,
//! build the snapshot, enqueue it on each target's outbound channel. No
//! await sits between mutation and enqueue, so for a given room the
//! broadcasts reach every subscriber in event-application order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tally_core::{Room, RoundState};

use crate::error::Error;
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ErrorKind, ParticipantInfo, RoundView, ServerMessage};
use crate::registry::{RoomRegistry, RoundTimer};

/// A connection's participant binding, set on join
#[derive(Debug, Clone)]
struct Binding {
    room_id: String,
    participant_id: Uuid,
}

/// One open transport
struct Connection {
    tx: mpsc::UnboundedSender<ServerMessage>,
    binding: Option<Binding>,
}

/// Gateway state shared across connection tasks
struct GatewayState {
    registry: RoomRegistry,
    connections: HashMap<Uuid, Connection>,
    /// Reverse lookup: participant -> connection
    participant_index: HashMap<Uuid, Uuid>,
}

impl GatewayState {
    fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            connections: HashMap::new(),
            participant_index: HashMap::new(),
        }
    }

    fn binding(&self, connection_id: Uuid) -> Option<Binding> {
        self.connections
            .get(&connection_id)
            .and_then(|c| c.binding.clone())
    }

    fn send_to(&self, connection_id: Uuid, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(&connection_id) {
            if conn.tx.send(msg).is_err() {
                debug!(connection_id = %connection_id, "Failed to queue message for connection");
            }
        }
    }

    fn send_error(&self, connection_id: Uuid, err: &tally_core::Error) {
        self.send_to(
            connection_id,
            ServerMessage::Error {
                kind: ErrorKind::from(err),
                message: err.to_string(),
            },
        );
    }

    /// Deliver to every connection bound to the room, resolved through the
    /// participant index. A dead outbound channel is logged and skipped,
    /// never aborting the fan-out.
    fn broadcast(&self, room_id: &str, msg: ServerMessage, exclude: Option<Uuid>) {
        let Some(entry) = self.registry.get(room_id) else {
            return;
        };
        for participant in entry.room.participants() {
            let Some(connection_id) = self.participant_index.get(&participant.id) else {
                debug!(participant_id = %participant.id, room_id = %room_id, "No connection bound for participant");
                continue;
            };
            if Some(*connection_id) == exclude {
                continue;
            }
            if let Some(conn) = self.connections.get(connection_id) {
                if conn.tx.send(msg.clone()).is_err() {
                    debug!(
                        connection_id = %connection_id,
                        room_id = %room_id,
                        "Failed to queue broadcast for connection"
                    );
                }
            }
        }
    }
}

/// Build the canonical member-list snapshot. Vote values stay hidden
/// until the round is revealed; in-flight progress travels as has_voted.
fn participants_snapshot(room: &Room) -> ServerMessage {
    let revealed = room.round.state == RoundState::Revealed;
    let participants = room
        .participants_ordered()
        .iter()
        .map(|p| ParticipantInfo {
            participant_id: p.id,
            display_name: p.display_name.clone(),
            is_host: room.is_host(p.id),
            has_voted: room.round.has_voted(p.id),
            vote: if revealed {
                room.round.votes.get(&p.id).cloned()
            } else {
                None
            },
        })
        .collect();
    ServerMessage::ParticipantsSnapshot { participants }
}

/// Build the canonical round snapshot
fn round_snapshot(room: &Room) -> ServerMessage {
    let revealed = room.round.state == RoundState::Revealed;
    ServerMessage::RoundSnapshot(RoundView {
        state: room.round.state,
        topic: room.topic.clone(),
        deadline: room.round.deadline,
        votes: if revealed {
            Some(room.round.votes.clone())
        } else {
            None
        },
    })
}

/// Session server handle
pub struct Server {
    addr: SocketAddr,
    state: Arc<RwLock<GatewayState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Start a new server on the given port (0 picks an ephemeral port)
    pub async fn start(port: u16) -> crate::error::Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(RwLock::new(GatewayState::new()));

        let state_clone = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(accept_loop(listener, state_clone, shutdown_rx));

        Ok(Server {
            addr: bound_addr,
            state,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.state.read().await.registry.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RwLock<GatewayState>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let state = state.clone();
                        tokio::spawn(handle_connection(stream, addr, state));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<RwLock<GatewayState>>) {
    let connection_id = Uuid::new_v4();
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();

    {
        let mut s = state.write().await;
        s.connections.insert(connection_id, Connection { tx, binding: None });
    }
    debug!(addr = %addr, connection_id = %connection_id, "Connection open");

    let writer_handle = tokio::spawn(writer_task(writer, rx));

    // Read loop
    loop {
        match read_frame::<_, ClientMessage>(&mut reader).await {
            Ok(msg) => {
                handle_message(&state, connection_id, msg).await;
            }
            Err(Error::ConnectionClosed) => {
                debug!(connection_id = %connection_id, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Read error");
                break;
            }
        }
    }

    // A vanished transport is an implicit leave
    disconnect(&state, connection_id).await;
    writer_handle.abort();
}

/// Writer task - drains the outbound queue to the client
async fn writer_task(
    mut writer: WriteHalf<TcpStream>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Route one inbound request
async fn handle_message(state: &Arc<RwLock<GatewayState>>, connection_id: Uuid, msg: ClientMessage) {
    match msg {
        ClientMessage::Join {
            room_id,
            display_name,
        } => join(state, connection_id, room_id, display_name).await,
        ClientMessage::StartVoting {
            room_id,
            duration_seconds,
        } => start_voting(state, connection_id, room_id, duration_seconds).await,
        ClientMessage::CastVote { room_id, value } => {
            cast_vote(state, connection_id, room_id, value).await
        }
        ClientMessage::Reveal { room_id } => reveal(state, connection_id, room_id).await,
        ClientMessage::Reset { room_id } => reset(state, connection_id, room_id).await,
        ClientMessage::SetTopic { room_id, topic } => {
            set_topic(state, connection_id, room_id, topic).await
        }
        ClientMessage::Leave { room_id } => leave(state, connection_id, room_id).await,
    }
}

/// Check that the connection is bound to the room it is addressing
fn resolve(
    s: &GatewayState,
    connection_id: Uuid,
    room_id: &str,
) -> tally_core::Result<Binding> {
    let Some(binding) = s.binding(connection_id) else {
        return Err(tally_core::Error::Validation(
            "connection has not joined a room".into(),
        ));
    };
    if binding.room_id != room_id {
        return Err(tally_core::Error::Validation(format!(
            "connection is not a member of room {}",
            room_id
        )));
    }
    if !s.registry.contains(room_id) {
        return Err(tally_core::Error::NotFound(format!(
            "room {} no longer exists",
            room_id
        )));
    }
    Ok(binding)
}

async fn join(
    state: &Arc<RwLock<GatewayState>>,
    connection_id: Uuid,
    room_id: String,
    display_name: String,
) {
    let mut s = state.write().await;

    if s.binding(connection_id).is_some() {
        s.send_error(
            connection_id,
            &tally_core::Error::StateConflict("connection already joined a room".into()),
        );
        return;
    }

    let joined = {
        let entry = s.registry.get_or_create(&room_id);
        entry.room.join(&display_name).map(|participant_id| {
            (
                participant_id,
                entry.room.is_host(participant_id),
                participants_snapshot(&entry.room),
                round_snapshot(&entry.room),
            )
        })
    };

    match joined {
        Err(e) => {
            // A rejected first join may have lazily created an empty room
            s.registry.remove_if_empty(&room_id);
            s.send_error(connection_id, &e);
        }
        Ok((participant_id, is_host, members, round)) => {
            if let Some(conn) = s.connections.get_mut(&connection_id) {
                conn.binding = Some(Binding {
                    room_id: room_id.clone(),
                    participant_id,
                });
            }
            s.participant_index.insert(participant_id, connection_id);

            info!(room_id = %room_id, participant_id = %participant_id, is_host, "Participant joined");

            // Existing members learn of the newcomer
            s.broadcast(
                &room_id,
                ServerMessage::ParticipantJoined {
                    display_name: display_name.trim().to_string(),
                },
                Some(connection_id),
            );
            s.broadcast(&room_id, members.clone(), Some(connection_id));

            // The joiner gets its identity plus the live round, so a late
            // joiner observes in-flight state rather than a stale idle view
            s.send_to(connection_id, ServerMessage::Joined { participant_id, is_host });
            s.send_to(connection_id, members);
            s.send_to(connection_id, round);
        }
    }
}

async fn start_voting(
    state: &Arc<RwLock<GatewayState>>,
    connection_id: Uuid,
    room_id: String,
    duration_seconds: Option<u64>,
) {
    let mut s = state.write().await;
    let binding = match resolve(&s, connection_id, &room_id) {
        Ok(b) => b,
        Err(e) => {
            s.send_error(connection_id, &e);
            return;
        }
    };

    let started = {
        let Some(entry) = s.registry.get_mut(&room_id) else {
            return;
        };
        match entry.room.start_voting(binding.participant_id, duration_seconds) {
            Err(e) => Err(e),
            Ok(()) => {
                // A superseded deadline timer must never fire against the
                // new round
                entry.clear_timer();
                if let Some(secs) = duration_seconds {
                    let epoch = entry.room.round.epoch;
                    let handle = tokio::spawn(deadline_task(
                        state.clone(),
                        room_id.clone(),
                        epoch,
                        Duration::from_secs(secs),
                    ));
                    entry.timer = Some(RoundTimer::new(epoch, handle));
                }
                Ok(round_snapshot(&entry.room))
            }
        }
    };

    match started {
        Err(e) => s.send_error(connection_id, &e),
        Ok(snapshot) => {
            info!(room_id = %room_id, ?duration_seconds, "Voting started");
            s.broadcast(&room_id, snapshot, None);
        }
    }
}

/// Fires the auto-reveal when a timed round's deadline passes. The epoch
/// check makes an aborted-but-already-woken timer a no-op.
async fn deadline_task(
    state: Arc<RwLock<GatewayState>>,
    room_id: String,
    epoch: u64,
    duration: Duration,
) {
    tokio::time::sleep(duration).await;

    let mut s = state.write().await;
    let revealed = {
        let Some(entry) = s.registry.get_mut(&room_id) else {
            debug!(room_id = %room_id, "Deadline fired for removed room");
            return;
        };
        if entry.room.round.epoch != epoch {
            debug!(room_id = %room_id, epoch, "Stale deadline timer, ignoring");
            return;
        }
        match entry.room.timer_reveal() {
            Ok(()) => {
                entry.timer = None;
                Some(round_snapshot(&entry.room))
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Deadline reveal failed");
                None
            }
        }
    };

    if let Some(snapshot) = revealed {
        info!(room_id = %room_id, "Deadline reached, votes revealed");
        s.broadcast(&room_id, snapshot, None);
    }
}

async fn cast_vote(
    state: &Arc<RwLock<GatewayState>>,
    connection_id: Uuid,
    room_id: String,
    value: tally_core::VoteValue,
) {
    let mut s = state.write().await;
    let binding = match resolve(&s, connection_id, &room_id) {
        Ok(b) => b,
        Err(e) => {
            s.send_error(connection_id, &e);
            return;
        }
    };

    let cast = {
        let Some(entry) = s.registry.get_mut(&room_id) else {
            return;
        };
        entry
            .room
            .cast_vote(binding.participant_id, value)
            .map(|()| participants_snapshot(&entry.room))
    };

    match cast {
        Err(e) => s.send_error(connection_id, &e),
        Ok(snapshot) => {
            debug!(room_id = %room_id, participant_id = %binding.participant_id, "Vote cast");
            s.broadcast(&room_id, snapshot, None);
        }
    }
}

async fn reveal(state: &Arc<RwLock<GatewayState>>, connection_id: Uuid, room_id: String) {
    let mut s = state.write().await;
    let binding = match resolve(&s, connection_id, &room_id) {
        Ok(b) => b,
        Err(e) => {
            s.send_error(connection_id, &e);
            return;
        }
    };

    let revealed = {
        let Some(entry) = s.registry.get_mut(&room_id) else {
            return;
        };
        entry.room.reveal(binding.participant_id).map(|()| {
            entry.clear_timer();
            round_snapshot(&entry.room)
        })
    };

    match revealed {
        Err(e) => s.send_error(connection_id, &e),
        Ok(snapshot) => {
            info!(room_id = %room_id, "Votes revealed");
            s.broadcast(&room_id, snapshot, None);
        }
    }
}

async fn reset(state: &Arc<RwLock<GatewayState>>, connection_id: Uuid, room_id: String) {
    let mut s = state.write().await;
    let binding = match resolve(&s, connection_id, &room_id) {
        Ok(b) => b,
        Err(e) => {
            s.send_error(connection_id, &e);
            return;
        }
    };

    let was_reset = {
        let Some(entry) = s.registry.get_mut(&room_id) else {
            return;
        };
        entry.room.reset(binding.participant_id).map(|()| {
            entry.clear_timer();
            round_snapshot(&entry.room)
        })
    };

    match was_reset {
        Err(e) => s.send_error(connection_id, &e),
        Ok(snapshot) => {
            info!(room_id = %room_id, "Round reset");
            s.broadcast(&room_id, snapshot, None);
        }
    }
}

async fn set_topic(
    state: &Arc<RwLock<GatewayState>>,
    connection_id: Uuid,
    room_id: String,
    topic: String,
) {
    let mut s = state.write().await;
    let binding = match resolve(&s, connection_id, &room_id) {
        Ok(b) => b,
        Err(e) => {
            s.send_error(connection_id, &e);
            return;
        }
    };

    let updated = {
        let Some(entry) = s.registry.get_mut(&room_id) else {
            return;
        };
        entry
            .room
            .set_topic(binding.participant_id, &topic)
            .map(|()| round_snapshot(&entry.room))
    };

    match updated {
        Err(e) => s.send_error(connection_id, &e),
        Ok(snapshot) => {
            debug!(room_id = %room_id, "Topic updated");
            s.broadcast(&room_id, snapshot, None);
        }
    }
}

async fn leave(state: &Arc<RwLock<GatewayState>>, connection_id: Uuid, room_id: String) {
    let mut s = state.write().await;
    match resolve(&s, connection_id, &room_id) {
        Err(e) => s.send_error(connection_id, &e),
        Ok(binding) => remove_participant(&mut s, connection_id, &binding),
    }
}

/// Shared removal path for explicit leave and transport loss
fn remove_participant(s: &mut GatewayState, connection_id: Uuid, binding: &Binding) {
    s.participant_index.remove(&binding.participant_id);
    if let Some(conn) = s.connections.get_mut(&connection_id) {
        conn.binding = None;
    }

    let (display_name, new_host_name, snapshot) = {
        let Some(entry) = s.registry.get_mut(&binding.room_id) else {
            return;
        };
        match entry.room.leave(binding.participant_id) {
            Err(e) => {
                warn!(room_id = %binding.room_id, error = %e, "Leave failed");
                return;
            }
            Ok(departure) => {
                let new_host_name = departure
                    .new_host_id
                    .and_then(|id| entry.room.display_name(id))
                    .map(|n| n.to_string());
                (
                    departure.display_name,
                    new_host_name,
                    participants_snapshot(&entry.room),
                )
            }
        }
    };

    info!(room_id = %binding.room_id, participant_id = %binding.participant_id, "Participant left");

    s.broadcast(
        &binding.room_id,
        ServerMessage::ParticipantLeft { display_name },
        None,
    );
    if let Some(display_name) = new_host_name {
        info!(room_id = %binding.room_id, new_host = %display_name, "Host migrated");
        s.broadcast(
            &binding.room_id,
            ServerMessage::HostMigrated { display_name },
            None,
        );
    }
    s.broadcast(&binding.room_id, snapshot, None);

    s.registry.remove_if_empty(&binding.room_id);
}

/// Transport closed without an explicit leave: resolve the binding and
/// run the same removal path, so no dangling participant survives
async fn disconnect(state: &Arc<RwLock<GatewayState>>, connection_id: Uuid) {
    let mut s = state.write().await;
    let binding = s
        .connections
        .remove(&connection_id)
        .and_then(|c| c.binding);
    if let Some(binding) = binding {
        remove_participant(&mut s, connection_id, &binding);
    }
}
