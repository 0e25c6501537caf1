use std::sync::Arc;
use std::time::Duration;

use crate::api::message::{ClientMessage, ServerMessage};
use crate::api::schema::{Decode, Encode, Schema};
use crate::content::ContentCatalog;
use crate::game::GameConfig;
use crate::server::error::ServerError;
use crate::server::protocol::{NetworkProtocol, SessionManager};
use crate::server::rooms::RoomDirectory;

pub mod context;
pub mod error;
pub mod protocol;
pub mod rooms;

pub type ServerResult = Result<(), ServerError>;

/// The assembled game server: a transport, a wire schema, the connection
/// registry and the room directory. Rooms run as their own actors; this
/// object only wires the edges together.
pub struct WarlockServer<N, S>
where
    N: NetworkProtocol,
    S: Schema,
{
    protocol: N,
    _schema: S,
    sessions: Arc<SessionManager>,
    directory: Arc<RoomDirectory>,
}

impl<N, S> WarlockServer<N, S>
where
    N: NetworkProtocol,
    S: Schema + Send + Sync + 'static,
{
    pub fn new(
        protocol: N,
        schema: S,
        catalog: Arc<dyn ContentCatalog>,
        config: GameConfig,
    ) -> Self {
        let sessions = Arc::new(SessionManager::default());
        let directory = Arc::new(RoomDirectory::new(
            Arc::clone(&sessions),
            catalog,
            config,
        ));
        Self {
            protocol,
            _schema: schema,
            sessions,
            directory,
        }
    }

    pub fn directory(&self) -> Arc<RoomDirectory> {
        Arc::clone(&self.directory)
    }

    pub async fn run(self) -> ServerResult
    where
        ClientMessage: Decode<S>,
        ServerMessage: Encode<S>,
    {
        let watchdog = Arc::clone(&self.directory);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                watchdog.sweep();
            }
        });

        self.protocol
            .run::<S>(self.sessions, self.directory)
            .await
    }
}
