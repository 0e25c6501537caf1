use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::effects::StatusEffectKind;
use crate::game::phase::GamePhase;
use crate::game::player::{PlayerId, PlayerPublic};

/// Canonical target id clients use to aim an action at the monster.
pub const MONSTER_TARGET: &str = "__monster__";

/// Closed registry of intra-room event types. The dotted wire name of each
/// kind is the one clients and the history buffer observe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EventKind {
    GameCreated,
    GameStarted,
    GameEnded,
    GameError,
    PhaseChanged,
    PlayerJoined,
    PlayerLeft,
    PlayerDisconnected,
    PlayerReconnected,
    PlayerDied,
    PlayerStatusUpdated,
    PlayerNameCheck,
    PlayerClassAbilities,
    ActionSubmitted,
    ActionExecuted,
    ActionRejected,
    ActionRacialAbility,
    ActionAdaptability,
    CombatDamageApplied,
    CombatHealingApplied,
    CombatEffectApplied,
    CombatEffectExpired,
    CoordinationBonus,
    MonsterAttacked,
    MonsterDied,
    WarlockConverted,
    SystemWarning,
    SystemError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GameCreated => "game.created",
            Self::GameStarted => "game.started",
            Self::GameEnded => "game.ended",
            Self::GameError => "game.error",
            Self::PhaseChanged => "phase.changed",
            Self::PlayerJoined => "player.joined",
            Self::PlayerLeft => "player.left",
            Self::PlayerDisconnected => "player.disconnected",
            Self::PlayerReconnected => "player.reconnected",
            Self::PlayerDied => "player.died",
            Self::PlayerStatusUpdated => "player.status.updated",
            Self::PlayerNameCheck => "player.name.check",
            Self::PlayerClassAbilities => "player.class.abilities",
            Self::ActionSubmitted => "action.submitted",
            Self::ActionExecuted => "action.executed",
            Self::ActionRejected => "action.rejected",
            Self::ActionRacialAbility => "action.racial_ability",
            Self::ActionAdaptability => "action.adaptability",
            Self::CombatDamageApplied => "combat.damage_applied",
            Self::CombatHealingApplied => "combat.healing_applied",
            Self::CombatEffectApplied => "combat.effect_applied",
            Self::CombatEffectExpired => "combat.effect_expired",
            Self::CoordinationBonus => "coordination.bonus",
            Self::MonsterAttacked => "monster.attacked",
            Self::MonsterDied => "monster.died",
            Self::WarlockConverted => "warlock.converted",
            Self::SystemWarning => "system.warning",
            Self::SystemError => "system.error",
        }
    }

    pub fn namespace(&self) -> &'static str {
        let name = self.as_str();
        name.split_once('.').map(|(ns, _)| ns).unwrap_or(name)
    }
}

/// Why a game ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Winner {
    Good,
    Evil,
    Draw,
}

/// A trophy computed against final player stats when the game ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrophyAward {
    pub player_id: PlayerId,
    pub player_name: String,
    pub trophy: String,
    pub value: u64,
}

/// Typed payloads, one variant per event kind. The Validation middleware
/// rejects an emit whose payload variant disagrees with its declared kind.
/// Serializes untagged: the wire sees the fields, the kind travels as the
/// event's `type` string.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum EventPayload {
    GameCreated {
        host_id: PlayerId,
        host_name: String,
    },
    GameStarted {
        round: u32,
        player_count: usize,
    },
    GameEnded {
        winner: Winner,
        rounds: u32,
        survivors: Vec<PlayerId>,
        trophies: Vec<TrophyAward>,
    },
    GameError {
        player_id: Option<PlayerId>,
        message: String,
    },
    PhaseChanged {
        old_phase: GamePhase,
        new_phase: GamePhase,
        round: u32,
        reason: String,
        duration_ms: Option<u64>,
    },
    PlayerJoined {
        player_id: PlayerId,
        player_name: String,
    },
    PlayerLeft {
        player_id: PlayerId,
        player_name: String,
    },
    PlayerDisconnected {
        player_id: PlayerId,
        round: u32,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    PlayerDied {
        player_id: PlayerId,
        killer_id: Option<String>,
        was_warlock: bool,
    },
    PlayerStatusUpdated {
        players: Vec<PlayerPublic>,
    },
    PlayerNameCheck {
        socket_id: u64,
        player_name: String,
        available: bool,
    },
    PlayerClassAbilities {
        socket_id: u64,
        class: String,
        abilities: Vec<String>,
    },
    ActionSubmitted {
        player_id: PlayerId,
        action_type: String,
        target_id: Option<String>,
        ability_id: Option<String>,
        command_id: Option<String>,
    },
    ActionExecuted {
        player_id: PlayerId,
        ability_id: String,
        target_id: Option<String>,
        round: u32,
    },
    ActionRejected {
        player_id: PlayerId,
        reason: String,
        ability_id: Option<String>,
    },
    ActionRacialAbility {
        player_id: PlayerId,
        ability_id: String,
        target_id: Option<String>,
        result: Option<String>,
    },
    ActionAdaptability {
        player_id: PlayerId,
        old_ability: String,
        new_ability: String,
        level: u32,
    },
    CombatDamageApplied {
        target_id: String,
        damage_amount: u32,
        target_hp_before: u32,
        target_hp_after: u32,
        attacker_id: Option<String>,
        ability_id: Option<String>,
    },
    CombatHealingApplied {
        target_id: String,
        heal_amount: u32,
        target_hp_before: u32,
        target_hp_after: u32,
        healer_id: Option<String>,
        ability_id: Option<String>,
    },
    CombatEffectApplied {
        target_id: String,
        effect: StatusEffectKind,
        turns: i32,
        source_id: Option<String>,
    },
    CombatEffectExpired {
        target_id: String,
        effect: StatusEffectKind,
    },
    CoordinationBonus {
        target_id: String,
        actor_ids: Vec<PlayerId>,
        multiplier: f64,
    },
    MonsterAttacked {
        target_id: PlayerId,
        damage: u32,
        monster_hp: u32,
    },
    MonsterDied {
        round: u32,
        new_level: u32,
    },
    WarlockConverted {
        player_id: PlayerId,
        converter_id: Option<PlayerId>,
    },
    SystemWarning {
        message: String,
    },
    SystemError {
        message: String,
    },
}

impl EventPayload {
    /// The kind this payload variant belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::GameCreated { .. } => EventKind::GameCreated,
            Self::GameStarted { .. } => EventKind::GameStarted,
            Self::GameEnded { .. } => EventKind::GameEnded,
            Self::GameError { .. } => EventKind::GameError,
            Self::PhaseChanged { .. } => EventKind::PhaseChanged,
            Self::PlayerJoined { .. } => EventKind::PlayerJoined,
            Self::PlayerLeft { .. } => EventKind::PlayerLeft,
            Self::PlayerDisconnected { .. } => EventKind::PlayerDisconnected,
            Self::PlayerReconnected { .. } => EventKind::PlayerReconnected,
            Self::PlayerDied { .. } => EventKind::PlayerDied,
            Self::PlayerStatusUpdated { .. } => EventKind::PlayerStatusUpdated,
            Self::PlayerNameCheck { .. } => EventKind::PlayerNameCheck,
            Self::PlayerClassAbilities { .. } => EventKind::PlayerClassAbilities,
            Self::ActionSubmitted { .. } => EventKind::ActionSubmitted,
            Self::ActionExecuted { .. } => EventKind::ActionExecuted,
            Self::ActionRejected { .. } => EventKind::ActionRejected,
            Self::ActionRacialAbility { .. } => EventKind::ActionRacialAbility,
            Self::ActionAdaptability { .. } => EventKind::ActionAdaptability,
            Self::CombatDamageApplied { .. } => EventKind::CombatDamageApplied,
            Self::CombatHealingApplied { .. } => EventKind::CombatHealingApplied,
            Self::CombatEffectApplied { .. } => EventKind::CombatEffectApplied,
            Self::CombatEffectExpired { .. } => EventKind::CombatEffectExpired,
            Self::CoordinationBonus { .. } => EventKind::CoordinationBonus,
            Self::MonsterAttacked { .. } => EventKind::MonsterAttacked,
            Self::MonsterDied { .. } => EventKind::MonsterDied,
            Self::WarlockConverted { .. } => EventKind::WarlockConverted,
            Self::SystemWarning { .. } => EventKind::SystemWarning,
            Self::SystemError { .. } => EventKind::SystemError,
        }
    }

    /// Field-level constraints the Validation middleware enforces beyond the
    /// kind/payload agreement check.
    pub fn check_fields(&self) -> Result<(), String> {
        fn non_empty(field: &'static str, value: &str) -> Result<(), String> {
            if value.is_empty() {
                Err(format!("field `{field}` must not be empty"))
            } else {
                Ok(())
            }
        }

        match self {
            Self::PlayerJoined { player_id, player_name }
            | Self::PlayerLeft { player_id, player_name } => {
                non_empty("playerId", player_id)?;
                non_empty("playerName", player_name)
            }
            Self::PlayerDisconnected { player_id, .. }
            | Self::PlayerReconnected { player_id }
            | Self::PlayerDied { player_id, .. }
            | Self::WarlockConverted { player_id, .. } => non_empty("playerId", player_id),
            Self::ActionSubmitted { player_id, action_type, .. } => {
                non_empty("playerId", player_id)?;
                non_empty("actionType", action_type)
            }
            Self::ActionExecuted { player_id, ability_id, .. } => {
                non_empty("playerId", player_id)?;
                non_empty("abilityId", ability_id)
            }
            Self::ActionRejected { player_id, reason, .. } => {
                non_empty("playerId", player_id)?;
                non_empty("reason", reason)
            }
            Self::CombatDamageApplied {
                target_id,
                damage_amount,
                target_hp_before,
                target_hp_after,
                ..
            } => {
                non_empty("targetId", target_id)?;
                if target_hp_after > target_hp_before {
                    return Err("damage must not raise hp".into());
                }
                if target_hp_before - target_hp_after != *damage_amount {
                    return Err("damageAmount must match the hp delta".into());
                }
                Ok(())
            }
            Self::CombatHealingApplied {
                target_id,
                target_hp_before,
                target_hp_after,
                ..
            } => {
                non_empty("targetId", target_id)?;
                if target_hp_after < target_hp_before {
                    return Err("healing must not lower hp".into());
                }
                Ok(())
            }
            Self::CombatEffectApplied { target_id, turns, .. } => {
                non_empty("targetId", target_id)?;
                if *turns < -1 {
                    return Err("turns must be -1 (permanent) or non-negative".into());
                }
                Ok(())
            }
            Self::CombatEffectExpired { target_id, .. } => non_empty("targetId", target_id),
            Self::PhaseChanged { old_phase, new_phase, .. } => {
                if old_phase == new_phase {
                    Err("phase change must change the phase".into())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// One event as observed by middleware, handlers and the history buffer.
/// Immutable once emitted; `event_id` is unique within the owning room.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    #[serde(rename = "type", serialize_with = "serialize_kind")]
    pub kind: EventKind,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub event_id: u64,
    pub game_code: String,
}

fn serialize_kind<S>(kind: &EventKind, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_names_follow_registry_namespaces() {
        assert_eq!(EventKind::PhaseChanged.as_str(), "phase.changed");
        assert_eq!(EventKind::CombatDamageApplied.namespace(), "combat");
        assert_eq!(EventKind::PlayerStatusUpdated.namespace(), "player");
        assert_eq!(EventKind::WarlockConverted.as_str(), "warlock.converted");
    }

    #[test]
    fn payload_kind_agrees_with_variant() {
        let payload = EventPayload::PlayerJoined {
            player_id: "p1".into(),
            player_name: "Ada".into(),
        };
        assert_eq!(payload.kind(), EventKind::PlayerJoined);
    }

    #[test]
    fn damage_payload_rejects_mismatched_delta() {
        let payload = EventPayload::CombatDamageApplied {
            target_id: "p2".into(),
            damage_amount: 5,
            target_hp_before: 20,
            target_hp_after: 16,
            attacker_id: None,
            ability_id: None,
        };
        assert!(payload.check_fields().is_err());
    }
}
