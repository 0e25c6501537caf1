use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::effects::{StatusEffectKind, StatusEffects};

/// Opaque, client-supplied and stable across reconnects. The transport
/// connection id is a separate, replaceable value.
pub type PlayerId = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RacialModifiers {
    #[serde(default)]
    pub blood_rage: bool,
    #[serde(default)]
    pub keen_senses: bool,
}

/// Aggregates carried through the whole game and consumed by the trophy pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub total_damage_dealt: u64,
    pub total_healing_done: u64,
    pub damage_taken: u64,
    pub highest_single_hit: u64,
    pub times_died: u32,
    pub self_heals: u32,
    pub abilities_used: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    /// Transport-assigned; replaced on reconnect.
    pub connection_id: u64,
    pub name: String,
    pub race: Option<String>,
    pub class: Option<String>,
    pub hp: u32,
    pub max_hp: u32,
    pub is_alive: bool,
    /// Hidden role. Server-only truth, never serialized into public views.
    pub is_warlock: bool,
    pub is_revealed: bool,
    pub ability_cooldowns: HashMap<String, u32>,
    pub status_effects: StatusEffects,
    pub has_submitted_action: bool,
    pub action_submission_time: Option<u64>,
    /// Ability ids in unlock-level order.
    pub unlocked_abilities: Vec<String>,
    pub is_ready: bool,
    pub racial_uses_left: u32,
    pub racial_used_this_round: bool,
    pub stats: PlayerStats,
    pub connected: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl Player {
    pub fn new(id: PlayerId, connection_id: u64, name: String) -> Self {
        Self {
            id,
            connection_id,
            name,
            race: None,
            class: None,
            hp: 0,
            max_hp: 0,
            is_alive: true,
            is_warlock: false,
            is_revealed: false,
            ability_cooldowns: HashMap::new(),
            status_effects: StatusEffects::default(),
            has_submitted_action: false,
            action_submission_time: None,
            unlocked_abilities: Vec::new(),
            is_ready: false,
            racial_uses_left: 0,
            racial_used_this_round: false,
            stats: PlayerStats::default(),
            connected: true,
            disconnected_at: None,
        }
    }

    pub fn has_selected_character(&self) -> bool {
        self.race.is_some() && self.class.is_some()
    }

    /// Applies raw damage after defensive adjustments computed by the caller.
    /// Clamps hp into `[0, max_hp]`, flips `is_alive` at zero and returns the
    /// hp actually lost.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let lost = amount.min(self.hp);
        self.hp -= lost;
        self.stats.damage_taken += u64::from(lost);
        if self.hp == 0 && self.is_alive {
            self.is_alive = false;
            self.stats.times_died += 1;
        }
        lost
    }

    /// Heals up to `max_hp`; dead players are not healed here (resurrection
    /// goes through the undying death trigger). Returns the hp restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.is_alive {
            return 0;
        }
        let restored = amount.min(self.max_hp - self.hp);
        self.hp += restored;
        restored
    }

    /// Undying: back to life at the given hp, consuming the effect.
    pub fn resurrect(&mut self, hp: u32) {
        self.is_alive = true;
        self.hp = hp.clamp(1, self.max_hp);
    }

    pub fn cooldown_remaining(&self, ability_id: &str) -> u32 {
        self.ability_cooldowns.get(ability_id).copied().unwrap_or(0)
    }

    pub fn set_cooldown(&mut self, ability_id: &str, turns: u32) {
        if turns > 0 {
            self.ability_cooldowns.insert(ability_id.to_string(), turns);
        }
    }

    /// Decrements every cooldown by one round, dropping the ones that reach
    /// zero. An ability used on round r with cooldown c is usable again on
    /// round r + c + 1.
    pub fn tick_cooldowns(&mut self) {
        self.ability_cooldowns.retain(|_, turns| {
            *turns -= 1;
            *turns > 0
        });
    }

    pub fn clear_submission(&mut self) {
        self.has_submitted_action = false;
        self.action_submission_time = None;
    }

    pub fn reset_for_new_round(&mut self) {
        self.clear_submission();
        self.is_ready = false;
        self.racial_used_this_round = false;
    }

    pub fn health_percent(&self) -> f64 {
        if self.max_hp == 0 {
            0.0
        } else {
            f64::from(self.hp) / f64::from(self.max_hp)
        }
    }

    pub fn has_effect(&self, kind: StatusEffectKind) -> bool {
        self.status_effects.has(kind)
    }

    /// The roster entry other clients may see. The hidden role leaks only
    /// once the player is revealed.
    pub fn public_view(&self) -> PlayerPublic {
        PlayerPublic {
            id: self.id.clone(),
            name: self.name.clone(),
            race: self.race.clone(),
            class: self.class.clone(),
            hp: self.hp,
            max_hp: self.max_hp,
            is_alive: self.is_alive,
            is_revealed: self.is_revealed,
            is_warlock: if self.is_revealed { Some(self.is_warlock) } else { None },
            has_submitted_action: self.has_submitted_action,
            is_ready: self.is_ready,
            connected: self.connected,
        }
    }
}

/// Public projection broadcast in `playerList` updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPublic {
    pub id: PlayerId,
    pub name: String,
    pub race: Option<String>,
    pub class: Option<String>,
    pub hp: u32,
    pub max_hp: u32,
    pub is_alive: bool,
    pub is_revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_warlock: Option<bool>,
    pub has_submitted_action: bool,
    pub is_ready: bool,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        let mut p = Player::new("p1".into(), 7, "Ada".into());
        p.hp = 30;
        p.max_hp = 30;
        p
    }

    #[test]
    fn damage_clamps_at_zero_and_kills() {
        let mut p = player();
        assert_eq!(p.take_damage(50), 30);
        assert_eq!(p.hp, 0);
        assert!(!p.is_alive);
        assert_eq!(p.stats.times_died, 1);
    }

    #[test]
    fn heal_clamps_at_max_and_skips_the_dead() {
        let mut p = player();
        p.take_damage(10);
        assert_eq!(p.heal(100), 10);
        assert_eq!(p.hp, 30);

        p.take_damage(100);
        assert_eq!(p.heal(5), 0);
    }

    #[test]
    fn cooldown_window_is_inclusive() {
        let mut p = player();
        p.set_cooldown("fireball", 2);
        assert_eq!(p.cooldown_remaining("fireball"), 2);
        p.tick_cooldowns();
        assert_eq!(p.cooldown_remaining("fireball"), 1);
        p.tick_cooldowns();
        assert_eq!(p.cooldown_remaining("fireball"), 0);
    }

    #[test]
    fn hidden_role_stays_hidden_until_revealed() {
        let mut p = player();
        p.is_warlock = true;
        assert_eq!(p.public_view().is_warlock, None);
        p.is_revealed = true;
        assert_eq!(p.public_view().is_warlock, Some(true));
    }
}
