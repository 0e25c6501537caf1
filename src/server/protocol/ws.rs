use std::sync::Arc;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Bytes, Message, Utf8Bytes};
use tokio_tungstenite::{WebSocketStream, accept_async};

use crate::api::message::{ClientMessage, ServerMessage};
use crate::api::schema::{Decode, Encode, Schema, SchemaType};
use crate::server::ServerResult;
use crate::server::error::ServerError;
use crate::server::protocol::{self, NetworkProtocol, SessionManager};
use crate::server::rooms::RoomDirectory;

/// WebSocket transport. One reader task per socket, plus a writer task
/// draining the connection's outbound channel.
pub struct WebSocketProtocol {
    addr: String,
}

impl WebSocketProtocol {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
        }
    }
}

impl NetworkProtocol for WebSocketProtocol {
    async fn run<S>(
        self,
        sessions: Arc<SessionManager>,
        directory: Arc<RoomDirectory>,
    ) -> ServerResult
    where
        S: Schema + Send + Sync + 'static,
        ClientMessage: Decode<S>,
        ServerMessage: Encode<S>,
    {
        let listener = TcpListener::bind(self.addr.as_str()).await.map_err(|err| {
            log::error!("failed to bind {}: {err}", self.addr);
            ServerError::StartFailure
        })?;
        log::info!("listening on {}", self.addr);

        loop {
            let Ok((stream, peer)) = listener.accept().await else {
                continue;
            };
            let sessions = Arc::clone(&sessions);
            let directory = Arc::clone(&directory);

            tokio::spawn(async move {
                let ws_stream = match accept_async(stream).await {
                    Ok(ws_stream) => ws_stream,
                    Err(err) => {
                        log::debug!("websocket handshake with {peer} failed: {err}");
                        return;
                    }
                };
                let (mut write, mut read) = ws_stream.split();

                // First frame must be the connect handshake.
                let Some(first) = next_payload(&mut read).await else {
                    return;
                };
                let (cxt, mut outbound) = match protocol::connect::<S>(&first, &sessions) {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::debug!("rejected connection from {peer}: {err}");
                        return;
                    }
                };
                sessions.send(
                    cxt.connection_id(),
                    <ServerMessage as Encode<S>>::encode(&ServerMessage::ConnectAck {
                        player_id: cxt.player_id().to_string(),
                        connection_id: cxt.connection_id(),
                    }),
                );
                log::debug!(
                    "connection {} established for player {}",
                    cxt.connection_id(),
                    cxt.player_id()
                );

                let writer = tokio::spawn(async move {
                    while let Some(buffer) = outbound.recv().await {
                        let message = match S::schema_type() {
                            SchemaType::Text => match Utf8Bytes::try_from(buffer) {
                                Ok(text) => Message::Text(text),
                                Err(_) => {
                                    log::warn!("non-utf8 frame dropped on a text schema");
                                    continue;
                                }
                            },
                            SchemaType::Binary => Message::Binary(buffer.into()),
                        };
                        if write.send(message).await.is_err() {
                            break;
                        }
                    }
                });

                while let Some(buffer) = next_payload(&mut read).await {
                    protocol::process_message::<S>(&buffer, &cxt, &sessions, &directory);
                }

                protocol::disconnect(&cxt, &sessions, &directory);
                writer.abort();
                log::debug!("connection {} closed", cxt.connection_id());
            });
        }
    }
}

/// Next data frame as raw bytes; control frames are skipped, close and
/// errors end the stream.
async fn next_payload(read: &mut SplitStream<WebSocketStream<TcpStream>>) -> Option<Vec<u8>> {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Binary(bytes)) => return Some(bytes.into()),
            Ok(Message::Text(text)) => return Some(Bytes::from(text).into()),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(err) => {
                log::debug!("websocket read error: {err}");
                return None;
            }
        }
    }
    None
}
