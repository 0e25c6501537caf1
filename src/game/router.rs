use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::game::bus::{EventBus, ListenerOptions};
use crate::game::event::{EventKind, EventPayload, GameEvent};
use crate::game::player::PlayerId;
use crate::server::protocol::SessionManager;

#[derive(Clone, Copy, Debug)]
enum Route {
    /// Everyone linked into the room.
    Broadcast,
    /// The player named in the payload (submitter acks, private reveals).
    ToPlayer,
    /// A raw connection id in the payload (pre-join responses).
    PerSocket,
    /// Per-player when the payload names one, otherwise broadcast.
    ErrorRoute,
}

/// EventBus type -> client message name -> routing, fixed at construction.
const OUTBOUND: &[(EventKind, &str, Route)] = &[
    (EventKind::GameCreated, "gameCreated", Route::Broadcast),
    (EventKind::GameStarted, "gameStarted", Route::Broadcast),
    (EventKind::GameEnded, "gameEnded", Route::Broadcast),
    (EventKind::PhaseChanged, "phaseChanged", Route::Broadcast),
    (EventKind::PlayerJoined, "playerJoined", Route::Broadcast),
    (EventKind::PlayerLeft, "playerLeft", Route::Broadcast),
    (EventKind::PlayerDisconnected, "playerDisconnected", Route::Broadcast),
    (EventKind::PlayerReconnected, "playerReconnected", Route::Broadcast),
    (EventKind::PlayerDied, "playerDied", Route::Broadcast),
    (EventKind::PlayerStatusUpdated, "playerList", Route::Broadcast),
    (EventKind::ActionSubmitted, "actionSubmitted", Route::ToPlayer),
    (EventKind::ActionExecuted, "actionExecuted", Route::ToPlayer),
    (EventKind::ActionRejected, "actionFailed", Route::ToPlayer),
    (EventKind::ActionRacialAbility, "racialAbilityUsed", Route::ToPlayer),
    (EventKind::ActionAdaptability, "abilityReplaced", Route::ToPlayer),
    (EventKind::CombatDamageApplied, "damageApplied", Route::Broadcast),
    (EventKind::CombatHealingApplied, "healingApplied", Route::Broadcast),
    (EventKind::CombatEffectApplied, "effectApplied", Route::Broadcast),
    (EventKind::CombatEffectExpired, "effectExpired", Route::Broadcast),
    (EventKind::CoordinationBonus, "coordinationBonus", Route::Broadcast),
    (EventKind::MonsterAttacked, "monsterAttacked", Route::Broadcast),
    (EventKind::MonsterDied, "monsterDied", Route::Broadcast),
    (EventKind::WarlockConverted, "warlockConverted", Route::ToPlayer),
    (EventKind::GameError, "errorMessage", Route::ErrorRoute),
    (EventKind::PlayerNameCheck, "nameCheckResponse", Route::PerSocket),
    (EventKind::PlayerClassAbilities, "classAbilitiesResponse", Route::PerSocket),
];

/// The routing state listeners share: the room's player ↔ connection map
/// plus the process-wide session registry.
pub struct RouterShared {
    game_code: String,
    sessions: Arc<SessionManager>,
    links: Mutex<HashMap<PlayerId, u64>>,
}

impl RouterShared {
    pub fn link(&self, player_id: &str, connection_id: u64) {
        if let Ok(mut links) = self.links.lock() {
            links.insert(player_id.to_string(), connection_id);
        }
    }

    pub fn unlink(&self, player_id: &str) {
        if let Ok(mut links) = self.links.lock() {
            links.remove(player_id);
        }
    }

    pub fn connection_of(&self, player_id: &str) -> Option<u64> {
        self.links.lock().ok()?.get(player_id).copied()
    }

    pub fn send_to_connection(&self, connection_id: u64, frame: &Value) {
        if let Ok(bytes) = serde_json::to_vec(frame) {
            self.sessions.send(connection_id, bytes);
        }
    }

    pub fn send_to_player(&self, player_id: &str, frame: &Value) {
        if let Some(connection_id) = self.connection_of(player_id) {
            self.send_to_connection(connection_id, frame);
        }
    }

    pub fn broadcast(&self, frame: &Value) {
        let Ok(bytes) = serde_json::to_vec(frame) else {
            return;
        };
        if let Ok(links) = self.links.lock() {
            self.sessions.send_all(links.values(), &bytes);
        }
    }

    /// Outbound frame: the payload's fields, stripped of internal-only
    /// values and annotated with `type`, `timestamp` and `gameCode`.
    fn frame(&self, name: &str, event: &GameEvent) -> Value {
        let mut object = match serde_json::to_value(&event.payload) {
            Ok(Value::Object(object)) => object,
            _ => serde_json::Map::new(),
        };
        object.remove("socketId");
        object.insert("type".to_string(), Value::String(name.to_string()));
        object
            .entry("timestamp")
            .or_insert_with(|| Value::String(event.timestamp.to_rfc3339()));
        object
            .entry("gameCode")
            .or_insert_with(|| Value::String(self.game_code.clone()));
        Value::Object(object)
    }

    fn deliver(&self, name: &str, route: Route, event: &GameEvent) {
        let frame = self.frame(name, event);
        match route {
            Route::Broadcast => self.broadcast(&frame),
            Route::ToPlayer => {
                if let Some(player_id) = payload_player_id(&event.payload) {
                    self.send_to_player(player_id, &frame);
                } else {
                    log::warn!("{} routed per-player without a player id", event.kind.as_str());
                }
            }
            Route::PerSocket => {
                if let Some(connection_id) = payload_socket_id(&event.payload) {
                    self.send_to_connection(connection_id, &frame);
                }
            }
            Route::ErrorRoute => match payload_player_id(&event.payload) {
                Some(player_id) => self.send_to_player(player_id, &frame),
                None => self.broadcast(&frame),
            },
        }
    }
}

fn payload_player_id(payload: &EventPayload) -> Option<&str> {
    match payload {
        EventPayload::ActionSubmitted { player_id, .. }
        | EventPayload::ActionExecuted { player_id, .. }
        | EventPayload::ActionRejected { player_id, .. }
        | EventPayload::ActionRacialAbility { player_id, .. }
        | EventPayload::ActionAdaptability { player_id, .. }
        | EventPayload::WarlockConverted { player_id, .. } => Some(player_id),
        EventPayload::GameError { player_id, .. } => player_id.as_deref(),
        _ => None,
    }
}

fn payload_socket_id(payload: &EventPayload) -> Option<u64> {
    match payload {
        EventPayload::PlayerNameCheck { socket_id, .. }
        | EventPayload::PlayerClassAbilities { socket_id, .. } => Some(*socket_id),
        _ => None,
    }
}

/// Bridges the room's EventBus to the transport: one listener per mapped
/// event type, installed once at room construction.
pub struct SocketRouter {
    shared: Arc<RouterShared>,
}

impl SocketRouter {
    pub fn new(game_code: String, sessions: Arc<SessionManager>) -> Self {
        Self {
            shared: Arc::new(RouterShared {
                game_code,
                sessions,
                links: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn shared(&self) -> Arc<RouterShared> {
        Arc::clone(&self.shared)
    }

    pub fn install(&self, bus: &mut EventBus) {
        for &(kind, name, route) in OUTBOUND {
            let shared = Arc::clone(&self.shared);
            bus.on(
                kind,
                Box::new(move |event| {
                    shared.deliver(name, route, event);
                    Ok(())
                }),
                ListenerOptions::default(),
            );
        }
    }
}
