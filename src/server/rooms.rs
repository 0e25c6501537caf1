use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rand::Rng;

use crate::api::message::ClientMessage;
use crate::content::ContentCatalog;
use crate::game::GameConfig;
use crate::game::processor::ActionData;
use crate::game::room::{Room, RoomHandle, RoomInput};
use crate::server::context::ConnectionContext;
use crate::server::error::ServerError;
use crate::server::protocol::SessionManager;

/// Process-wide registry of live rooms: allocates the 4-digit codes, routes
/// decoded client messages to room channels, and sweeps out finished rooms.
pub struct RoomDirectory {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    /// connection id -> game code, for disconnect routing.
    memberships: RwLock<HashMap<u64, String>>,
    sessions: Arc<SessionManager>,
    catalog: Arc<dyn ContentCatalog>,
    config: GameConfig,
}

impl RoomDirectory {
    pub fn new(
        sessions: Arc<SessionManager>,
        catalog: Arc<dyn ContentCatalog>,
        config: GameConfig,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
            sessions,
            catalog,
            config,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or(0)
    }

    /// Allocates a fresh 4-digit code (1000–9999, unique among live rooms)
    /// and spawns the room under it, atomically with respect to other
    /// creations.
    pub fn create_game(
        &self,
        cxt: &Arc<ConnectionContext>,
        host_name: String,
    ) -> Result<String, ServerError> {
        let mut rooms = self.rooms.write().map_err(|_| ServerError::StartFailure)?;
        if rooms.len() >= 9000 {
            return Err(ServerError::CodesExhausted);
        }
        let mut rng = rand::thread_rng();
        let code = loop {
            let candidate = rng.gen_range(1000..=9999).to_string();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let room = Room::new(
            code.clone(),
            Arc::clone(&self.catalog),
            self.config.clone(),
            Arc::clone(&self.sessions),
        );
        let handle = room.spawn();
        handle.send(RoomInput::Join {
            player_id: cxt.player_id().to_string(),
            connection_id: cxt.connection_id(),
            player_name: host_name,
        });
        rooms.insert(code.clone(), handle);
        drop(rooms);

        self.remember(cxt.connection_id(), &code);
        log::info!("room {code} created by {}", cxt.player_id());
        Ok(code)
    }

    fn remember(&self, connection_id: u64, code: &str) {
        if let Ok(mut memberships) = self.memberships.write() {
            memberships.insert(connection_id, code.to_string());
        }
    }

    fn forward(&self, code: &str, input: RoomInput) -> Result<(), ServerError> {
        let rooms = self.rooms.read().map_err(|_| ServerError::RoomNotFound)?;
        let handle = rooms.get(code).ok_or(ServerError::RoomNotFound)?;
        if handle.send(input) {
            Ok(())
        } else {
            Err(ServerError::RoomClosed)
        }
    }

    /// Dispatches one decoded post-handshake message.
    pub fn route(
        &self,
        cxt: &Arc<ConnectionContext>,
        message: ClientMessage,
    ) -> Result<(), ServerError> {
        let player_id = cxt.player_id().to_string();
        match message {
            ClientMessage::Connect { .. } => Err(ServerError::AlreadyConnected),
            ClientMessage::CreateGame { host_name } => {
                self.create_game(cxt, host_name).map(|_| ())
            }
            ClientMessage::JoinGame {
                game_code,
                player_name,
            } => {
                self.remember(cxt.connection_id(), &game_code);
                self.forward(
                    &game_code,
                    RoomInput::Join {
                        player_id,
                        connection_id: cxt.connection_id(),
                        player_name,
                    },
                )
            }
            ClientMessage::CheckNameAvailability {
                game_code,
                player_name,
            } => self.forward(
                &game_code,
                RoomInput::NameCheck {
                    connection_id: cxt.connection_id(),
                    player_name,
                },
            ),
            ClientMessage::SelectCharacter {
                game_code,
                race,
                class,
            } => self.forward(
                &game_code,
                RoomInput::SelectCharacter {
                    player_id,
                    race,
                    class,
                },
            ),
            ClientMessage::GetClassAbilities { game_code, class } => self.forward(
                &game_code,
                RoomInput::ClassAbilities {
                    connection_id: cxt.connection_id(),
                    class,
                },
            ),
            ClientMessage::StartGame { game_code } => {
                self.forward(&game_code, RoomInput::StartGame { player_id })
            }
            ClientMessage::PerformAction {
                game_code,
                action_type,
                target_id,
                blood_rage_active,
                keen_senses_active,
            } => self.forward(
                &game_code,
                RoomInput::PerformAction {
                    player_id,
                    data: ActionData {
                        action_type,
                        target_id,
                        blood_rage: blood_rage_active.unwrap_or(false),
                        keen_senses: keen_senses_active.unwrap_or(false),
                        metadata: None,
                    },
                },
            ),
            ClientMessage::UseRacialAbility {
                game_code,
                target_id,
                ability_type,
            } => self.forward(
                &game_code,
                RoomInput::UseRacialAbility {
                    player_id,
                    ability_type,
                    target_id,
                },
            ),
            ClientMessage::AdaptabilityReplaceAbility {
                game_code,
                old_ability_type,
                new_ability_type,
                level,
            } => self.forward(
                &game_code,
                RoomInput::Adaptability {
                    player_id,
                    old_ability: old_ability_type,
                    new_ability: new_ability_type,
                    level,
                },
            ),
            ClientMessage::PlayerNextReady { game_code } => {
                self.forward(&game_code, RoomInput::NextReady { player_id })
            }
            ClientMessage::PlayerNextNotReady { game_code } => {
                self.forward(&game_code, RoomInput::NextNotReady { player_id })
            }
        }
    }

    /// Socket closed: the room the connection sat in learns about it.
    pub fn handle_disconnect(&self, cxt: &Arc<ConnectionContext>) {
        let code = self
            .memberships
            .write()
            .ok()
            .and_then(|mut memberships| memberships.remove(&cxt.connection_id()));
        if let Some(code) = code {
            let _ = self.forward(
                &code,
                RoomInput::Disconnect {
                    player_id: cxt.player_id().to_string(),
                },
            );
        }
    }

    /// Drops rooms whose actor exited (game over or everyone gone). Run
    /// periodically by the server's watchdog task.
    pub fn sweep(&self) {
        let Ok(mut rooms) = self.rooms.write() else {
            return;
        };
        let before = rooms.len();
        rooms.retain(|code, handle| {
            let alive = !handle.is_finished();
            if !alive {
                log::info!("sweeping finished room {code}");
            }
            alive
        });
        if rooms.len() != before
            && let Ok(mut memberships) = self.memberships.write()
        {
            memberships.retain(|_, code| rooms.contains_key(code));
        }
    }
}
