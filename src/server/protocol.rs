use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::message::{ClientMessage, ServerMessage};
use crate::api::schema::{Decode, Encode, Schema};
use crate::server::ServerResult;
use crate::server::context::ConnectionContext;
use crate::server::error::ServerError;
use crate::server::rooms::RoomDirectory;

pub mod ws;

/// A transport that accepts connections and feeds decoded client messages
/// into the room layer. The shipped implementation speaks WebSocket.
pub trait NetworkProtocol {
    fn run<S>(
        self,
        sessions: Arc<SessionManager>,
        directory: Arc<RoomDirectory>,
    ) -> impl Future<Output = ServerResult>
    where
        S: Schema + Send + Sync + 'static,
        ClientMessage: Decode<S>,
        ServerMessage: Encode<S>;
}

/// Connection registry: a monotonically assigned connection id per socket
/// and an outbound byte channel pumped by the socket's writer task.
#[derive(Default)]
pub struct SessionManager {
    next_connection_id: AtomicU64,
    sessions: RwLock<HashMap<u64, UnboundedSender<Vec<u8>>>>,
}

impl SessionManager {
    /// Registers a new connection and hands back its id plus the stream the
    /// writer task drains.
    pub fn connect(&self) -> (u64, UnboundedReceiver<Vec<u8>>) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(connection_id, tx);
        }
        (connection_id, rx)
    }

    pub fn disconnect(&self, connection_id: u64) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&connection_id);
        }
    }

    pub fn is_connected(&self, connection_id: u64) -> bool {
        self.sessions
            .read()
            .map(|sessions| sessions.contains_key(&connection_id))
            .unwrap_or(false)
    }

    pub fn send(&self, connection_id: u64, message: Vec<u8>) {
        if let Ok(sessions) = self.sessions.read()
            && let Some(session) = sessions.get(&connection_id)
            && session.send(message).is_err()
        {
            log::trace!("connection {connection_id} closed; dropping message");
        }
    }

    pub fn send_all<'a>(&self, connection_ids: impl Iterator<Item = &'a u64>, message: &[u8]) {
        if let Ok(sessions) = self.sessions.read() {
            for connection_id in connection_ids {
                if let Some(session) = sessions.get(connection_id) {
                    let _ = session.send(message.to_vec());
                }
            }
        }
    }
}

/// Decodes and runs the handshake frame. Every socket must introduce itself
/// with `connect` before anything else.
pub fn connect<S: Schema>(
    raw_message: &[u8],
    sessions: &SessionManager,
) -> Result<(Arc<ConnectionContext>, UnboundedReceiver<Vec<u8>>), ServerError>
where
    ClientMessage: Decode<S>,
{
    let message =
        <ClientMessage as Decode<S>>::decode(raw_message).map_err(|_| ServerError::NotConnected)?;
    match message {
        ClientMessage::Connect {
            player_id,
            player_name,
        } => {
            if player_id.is_empty() {
                return Err(ServerError::InvalidInput);
            }
            let (connection_id, rx) = sessions.connect();
            let cxt = Arc::new(ConnectionContext::new(connection_id, player_id, player_name));
            Ok((cxt, rx))
        }
        _ => Err(ServerError::NotConnected),
    }
}

/// Routes one decoded post-handshake message into the room layer. Errors
/// bounce straight back to the sender as error frames.
pub fn process_message<S: Schema>(
    raw_message: &[u8],
    cxt: &Arc<ConnectionContext>,
    sessions: &SessionManager,
    directory: &RoomDirectory,
) where
    ClientMessage: Decode<S>,
    ServerMessage: Encode<S>,
{
    let message = match <ClientMessage as Decode<S>>::decode(raw_message) {
        Ok(message) => message,
        Err(_) => {
            sessions.send(
                cxt.connection_id(),
                <ServerMessage as Encode<S>>::encode(&ServerMessage::from(
                    ServerError::DeserializationFailure,
                )),
            );
            return;
        }
    };

    let result = match message {
        ClientMessage::Connect { .. } => Err(ServerError::AlreadyConnected),
        other => directory.route(cxt, other),
    };

    if let Err(error) = result {
        log::debug!("connection {} request failed: {error}", cxt.connection_id());
        sessions.send(
            cxt.connection_id(),
            <ServerMessage as Encode<S>>::encode(&ServerMessage::from(error)),
        );
    }
}

/// Socket teardown: the room the player sat in learns about the drop.
pub fn disconnect(
    cxt: &Arc<ConnectionContext>,
    sessions: &SessionManager,
    directory: &RoomDirectory,
) {
    directory.handle_disconnect(cxt);
    sessions.disconnect(cxt.connection_id());
}
