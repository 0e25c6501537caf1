use serde::{Deserialize, Serialize};

/// Client → server message taxonomy. Externally tagged with `type`, field
/// names in camelCase, matching what the browser client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Handshake; must be the first frame on a socket. `playerId` is
    /// client-generated and stable across reconnects.
    Connect {
        player_id: String,
        player_name: String,
    },
    CreateGame {
        host_name: String,
    },
    JoinGame {
        game_code: String,
        player_name: String,
    },
    CheckNameAvailability {
        game_code: String,
        player_name: String,
    },
    SelectCharacter {
        game_code: String,
        race: String,
        class: String,
    },
    GetClassAbilities {
        game_code: String,
        class: String,
    },
    StartGame {
        game_code: String,
    },
    PerformAction {
        game_code: String,
        action_type: String,
        #[serde(default)]
        target_id: Option<String>,
        #[serde(default)]
        blood_rage_active: Option<bool>,
        #[serde(default)]
        keen_senses_active: Option<bool>,
    },
    UseRacialAbility {
        game_code: String,
        #[serde(default)]
        target_id: Option<String>,
        ability_type: String,
    },
    AdaptabilityReplaceAbility {
        game_code: String,
        old_ability_type: String,
        new_ability_type: String,
        level: u32,
    },
    PlayerNextReady {
        game_code: String,
    },
    PlayerNextNotReady {
        game_code: String,
    },
}

impl ClientMessage {
    /// The room code this message addresses, if any.
    pub fn game_code(&self) -> Option<&str> {
        match self {
            Self::Connect { .. } | Self::CreateGame { .. } => None,
            Self::JoinGame { game_code, .. }
            | Self::CheckNameAvailability { game_code, .. }
            | Self::SelectCharacter { game_code, .. }
            | Self::GetClassAbilities { game_code, .. }
            | Self::StartGame { game_code }
            | Self::PerformAction { game_code, .. }
            | Self::UseRacialAbility { game_code, .. }
            | Self::AdaptabilityReplaceAbility { game_code, .. }
            | Self::PlayerNextReady { game_code }
            | Self::PlayerNextNotReady { game_code } => Some(game_code),
        }
    }
}

/// Connection-level frames the server itself produces. Room traffic rides
/// the SocketRouter's event frames instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ConnectAck {
        player_id: String,
        connection_id: u64,
    },
    ErrorMessage {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perform_action_decodes_from_client_json() {
        let raw = r#"{
            "type": "performAction",
            "gameCode": "1234",
            "actionType": "fireball",
            "targetId": "p2",
            "bloodRageActive": true
        }"#;
        let message: ClientMessage = serde_json::from_str(raw).unwrap();
        match message {
            ClientMessage::PerformAction {
                game_code,
                action_type,
                target_id,
                blood_rage_active,
                keen_senses_active,
            } => {
                assert_eq!(game_code, "1234");
                assert_eq!(action_type, "fireball");
                assert_eq!(target_id.as_deref(), Some("p2"));
                assert_eq!(blood_rage_active, Some(true));
                assert_eq!(keen_senses_active, None);
            }
            other => panic!("decoded the wrong variant: {other:?}"),
        }
    }

    #[test]
    fn server_frames_carry_their_type_tag() {
        let encoded = serde_json::to_value(ServerMessage::ErrorMessage {
            message: "Room not found".into(),
        })
        .unwrap();
        assert_eq!(encoded["type"], "errorMessage");
        assert_eq!(encoded["message"], "Room not found");
    }

    #[test]
    fn game_code_extraction_covers_room_messages() {
        let message = ClientMessage::PlayerNextReady { game_code: "4321".into() };
        assert_eq!(message.game_code(), Some("4321"));
        let message = ClientMessage::CreateGame { host_name: "Ada".into() };
        assert_eq!(message.game_code(), None);
    }
}
