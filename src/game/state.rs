use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::content::ContentCatalog;
use crate::game::bus::EventBus;
use crate::game::effects::{StatusEffect, StatusEffectKind};
use crate::game::event::{EventKind, EventPayload, MONSTER_TARGET};
use crate::game::monster::{Monster, MonsterConfig};
use crate::game::player::{Player, PlayerId, PlayerPublic};

/// Mutable room truth: the roster, the monster, the unlock level. Owned by
/// the room alongside (not inside) the bus/processor/controller, so every
/// subsystem borrows it explicitly instead of holding back references.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub code: String,
    players: HashMap<PlayerId, Player>,
    join_order: Vec<PlayerId>,
    pub monster: Option<Monster>,
    pub host_id: Option<PlayerId>,
    pub started_at: Option<DateTime<Utc>>,
    /// Ability unlock level; rises when the monster falls.
    pub level: u32,
    /// Set on fatal room errors; no further commands are accepted.
    pub terminal: bool,
}

impl GameState {
    pub fn new(code: String) -> Self {
        Self {
            code,
            players: HashMap::new(),
            join_order: Vec::new(),
            monster: None,
            host_id: None,
            started_at: None,
            level: 1,
            terminal: false,
        }
    }

    pub fn add_player(&mut self, player: Player) {
        if self.host_id.is_none() {
            self.host_id = Some(player.id.clone());
        }
        self.join_order.push(player.id.clone());
        self.players.insert(player.id.clone(), player);
    }

    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        self.join_order.retain(|id| id != player_id);
        let removed = self.players.remove(player_id);
        if self.host_id.as_deref() == Some(player_id) {
            self.host_id = self.join_order.first().cloned();
        }
        removed
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.get_mut(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.join_order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.join_order.clone()
    }

    pub fn living_ids(&self) -> Vec<PlayerId> {
        self.players()
            .filter(|p| p.is_alive)
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn living_count(&self) -> usize {
        self.players().filter(|p| p.is_alive).count()
    }

    pub fn living_warlocks(&self) -> usize {
        self.players().filter(|p| p.is_alive && p.is_warlock).count()
    }

    pub fn living_good(&self) -> usize {
        self.players().filter(|p| p.is_alive && !p.is_warlock).count()
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.players()
            .any(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn all_selected(&self) -> bool {
        self.players().all(Player::has_selected_character)
    }

    pub fn public_roster(&self) -> Vec<PlayerPublic> {
        self.players().map(Player::public_view).collect()
    }

    /// Character selection: race-modified hit points, unlocks at the current
    /// level, racial uses, and racial passives as permanent effects.
    pub fn apply_selection(
        &mut self,
        player_id: &str,
        race: &str,
        class: &str,
        catalog: &dyn ContentCatalog,
    ) {
        let base_hp = catalog.base_hp();
        let level = self.level;
        let Some(attrs) = catalog.race_attributes(race) else {
            return;
        };
        let max_hp = (f64::from(base_hp) * attrs.hp_modifier).round() as u32;
        let unlocked = unlocked_for(catalog, class, level);
        let racial = catalog.racial_ability(race);
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };

        player.race = Some(race.to_string());
        player.class = Some(class.to_string());
        player.max_hp = max_hp;
        player.hp = max_hp;
        player.unlocked_abilities = unlocked;
        if let Some(racial) = racial {
            player.racial_uses_left = racial.max_uses;
            if let Some(passive) = racial_passive(catalog, &racial.id) {
                player.status_effects.apply(passive);
            }
        }
    }

    /// Hidden-role assignment at game start: roughly one warlock per four
    /// players, at least one.
    pub fn assign_warlocks<R: Rng>(&mut self, rng: &mut R) -> Vec<PlayerId> {
        let ids = self.player_ids();
        let count = ids.len().div_ceil(4).max(1);
        let mut pool = ids;
        let mut chosen = Vec::new();
        for _ in 0..count.min(pool.len()) {
            let pick = rng.gen_range(0..pool.len());
            chosen.push(pool.swap_remove(pick));
        }
        for id in &chosen {
            if let Some(player) = self.players.get_mut(id) {
                player.is_warlock = true;
            }
        }
        chosen
    }

    pub fn spawn_monster(&mut self, config: &MonsterConfig) {
        self.monster = Some(Monster::spawn(config, self.players.len()));
    }

    /// Re-derives every player's unlocked ability list for the current level,
    /// preserving adaptability swaps for ability ids still known.
    pub fn refresh_unlocks(&mut self, catalog: &dyn ContentCatalog) {
        let level = self.level;
        for id in self.join_order.clone() {
            let Some(class) = self.players.get(&id).and_then(|p| p.class.clone()) else {
                continue;
            };
            let unlocked = unlocked_for(catalog, &class, level);
            if let Some(player) = self.players.get_mut(&id) {
                for ability in unlocked {
                    if !player.unlocked_abilities.contains(&ability) {
                        player.unlocked_abilities.push(ability);
                    }
                }
            }
        }
    }

    /// Damage landing on a player, after defender-side adjustments:
    /// sanctuary blocks, invisibility foils player attackers, vulnerability
    /// amplifies, race armor and stone armor shave, shields absorb. Emits
    /// the combat event and, on a kill, the death event. Returns hp lost.
    pub fn damage_player(
        &mut self,
        bus: &mut EventBus,
        target_id: &str,
        raw: u32,
        attacker_id: Option<&str>,
        ability_id: Option<&str>,
        catalog: &dyn ContentCatalog,
    ) -> u32 {
        let attacker_is_player = attacker_id.is_some_and(|id| id != MONSTER_TARGET);
        let Some(target) = self.players.get_mut(target_id) else {
            return 0;
        };
        if !target.is_alive {
            return 0;
        }

        let mut amount = f64::from(raw);
        if target.has_effect(StatusEffectKind::Sanctuary) {
            amount = 0.0;
        }
        if attacker_is_player && target.has_effect(StatusEffectKind::Invisible) {
            amount = 0.0;
        }
        if target.has_effect(StatusEffectKind::Vulnerable) {
            let boost = target.status_effects.magnitude_of(StatusEffectKind::Vulnerable);
            amount *= 1.0 + f64::from(boost) / 100.0;
        }
        if let Some(race) = target.race.as_deref()
            && let Some(attrs) = catalog.race_attributes(race)
        {
            amount *= (1.0 - attrs.armor_modifier).max(0.0);
        }
        let mut amount = amount.round() as u32;
        let stone = target.status_effects.magnitude_of(StatusEffectKind::StoneArmor);
        amount = amount.saturating_sub(stone.max(0) as u32);
        if amount > 0 {
            amount -= target.status_effects.consume_magnitude(StatusEffectKind::Shielded, amount);
        }

        let hp_before = target.hp;
        let lost = target.take_damage(amount);
        let hp_after = target.hp;
        let died = hp_before > 0 && hp_after == 0;
        let was_warlock = target.is_warlock;
        let reflect = target
            .status_effects
            .magnitude_of(StatusEffectKind::SpiritGuard)
            .max(0) as u32;
        if died {
            target.is_revealed = true;
        }

        if let Some(attacker) = attacker_id.filter(|id| *id != MONSTER_TARGET)
            && let Some(attacker) = self.players.get_mut(attacker)
        {
            attacker.stats.total_damage_dealt += u64::from(lost);
            attacker.stats.highest_single_hit = attacker.stats.highest_single_hit.max(u64::from(lost));
        }

        bus.emit(
            EventKind::CombatDamageApplied,
            EventPayload::CombatDamageApplied {
                target_id: target_id.to_string(),
                damage_amount: lost,
                target_hp_before: hp_before,
                target_hp_after: hp_after,
                attacker_id: attacker_id.map(str::to_string),
                ability_id: ability_id.map(str::to_string),
            },
            Default::default(),
        );

        if died {
            bus.emit(
                EventKind::PlayerDied,
                EventPayload::PlayerDied {
                    player_id: target_id.to_string(),
                    killer_id: attacker_id.map(str::to_string),
                    was_warlock,
                },
                Default::default(),
            );
        }

        if lost > 0 && reflect > 0 && attacker_is_player {
            let attacker = attacker_id.map(str::to_string);
            if let Some(attacker) = attacker {
                // Reflected damage does not reflect back.
                self.plain_damage_player(bus, &attacker, reflect, Some(target_id));
            }
        }

        lost
    }

    /// Flat damage with no defensive pipeline; used for reflections and
    /// self-costs so they cannot recurse.
    pub fn plain_damage_player(
        &mut self,
        bus: &mut EventBus,
        target_id: &str,
        amount: u32,
        source_id: Option<&str>,
    ) -> u32 {
        let Some(target) = self.players.get_mut(target_id) else {
            return 0;
        };
        if !target.is_alive {
            return 0;
        }
        let hp_before = target.hp;
        let lost = target.take_damage(amount);
        let died = hp_before > 0 && target.hp == 0;
        let was_warlock = target.is_warlock;
        if died {
            target.is_revealed = true;
        }
        let hp_after = target.hp;
        bus.emit(
            EventKind::CombatDamageApplied,
            EventPayload::CombatDamageApplied {
                target_id: target_id.to_string(),
                damage_amount: lost,
                target_hp_before: hp_before,
                target_hp_after: hp_after,
                attacker_id: source_id.map(str::to_string),
                ability_id: None,
            },
            Default::default(),
        );
        if died {
            bus.emit(
                EventKind::PlayerDied,
                EventPayload::PlayerDied {
                    player_id: target_id.to_string(),
                    killer_id: source_id.map(str::to_string),
                    was_warlock,
                },
                Default::default(),
            );
        }
        lost
    }

    pub fn heal_player(
        &mut self,
        bus: &mut EventBus,
        target_id: &str,
        amount: u32,
        healer_id: Option<&str>,
        ability_id: Option<&str>,
    ) -> u32 {
        let Some(target) = self.players.get_mut(target_id) else {
            return 0;
        };
        let hp_before = target.hp;
        let restored = target.heal(amount);
        let hp_after = target.hp;
        if restored == 0 {
            return 0;
        }

        if let Some(healer) = healer_id
            && let Some(healer_player) = self.players.get_mut(healer)
        {
            healer_player.stats.total_healing_done += u64::from(restored);
            if healer == target_id {
                healer_player.stats.self_heals += 1;
            }
        }

        bus.emit(
            EventKind::CombatHealingApplied,
            EventPayload::CombatHealingApplied {
                target_id: target_id.to_string(),
                heal_amount: restored,
                target_hp_before: hp_before,
                target_hp_after: hp_after,
                healer_id: healer_id.map(str::to_string),
                ability_id: ability_id.map(str::to_string),
            },
            Default::default(),
        );
        restored
    }

    pub fn damage_monster(
        &mut self,
        bus: &mut EventBus,
        raw: u32,
        attacker_id: Option<&str>,
        ability_id: Option<&str>,
    ) -> u32 {
        let Some(monster) = self.monster.as_mut() else {
            return 0;
        };
        let hp_before = monster.hp;
        let lost = monster.take_damage(raw);
        let hp_after = monster.hp;

        if let Some(attacker) = attacker_id
            && let Some(attacker) = self.players.get_mut(attacker)
        {
            attacker.stats.total_damage_dealt += u64::from(lost);
            attacker.stats.highest_single_hit = attacker.stats.highest_single_hit.max(u64::from(lost));
        }

        bus.emit(
            EventKind::CombatDamageApplied,
            EventPayload::CombatDamageApplied {
                target_id: MONSTER_TARGET.to_string(),
                damage_amount: lost,
                target_hp_before: hp_before,
                target_hp_after: hp_after,
                attacker_id: attacker_id.map(str::to_string),
                ability_id: ability_id.map(str::to_string),
            },
            Default::default(),
        );
        lost
    }

    pub fn heal_monster(&mut self, bus: &mut EventBus, amount: u32, ability_id: Option<&str>) -> u32 {
        let Some(monster) = self.monster.as_mut() else {
            return 0;
        };
        let hp_before = monster.hp;
        let restored = monster.heal(amount);
        if restored > 0 {
            bus.emit(
                EventKind::CombatHealingApplied,
                EventPayload::CombatHealingApplied {
                    target_id: MONSTER_TARGET.to_string(),
                    heal_amount: restored,
                    target_hp_before: hp_before,
                    target_hp_after: monster.hp,
                    healer_id: None,
                    ability_id: ability_id.map(str::to_string),
                },
                Default::default(),
            );
        }
        restored
    }

    pub fn apply_effect_to_player(
        &mut self,
        bus: &mut EventBus,
        target_id: &str,
        effect: StatusEffect,
    ) {
        let Some(target) = self.players.get_mut(target_id) else {
            return;
        };
        let kind = effect.kind;
        let turns = effect.turns_remaining;
        let source = effect.source_player_id.clone();
        use crate::game::effects::ApplyOutcome;
        if matches!(target.status_effects.apply(effect), ApplyOutcome::Rejected) {
            return;
        }
        bus.emit(
            EventKind::CombatEffectApplied,
            EventPayload::CombatEffectApplied {
                target_id: target_id.to_string(),
                effect: kind,
                turns,
                source_id: source,
            },
            Default::default(),
        );
    }
}

fn unlocked_for(catalog: &dyn ContentCatalog, class: &str, level: u32) -> Vec<String> {
    catalog
        .class_abilities(class)
        .map(|abilities| {
            abilities
                .iter()
                .filter(|a| a.unlock_at <= level)
                .map(|a| a.id.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn racial_passive(catalog: &dyn ContentCatalog, racial_id: &str) -> Option<StatusEffect> {
    let kind = match racial_id {
        "stoneArmor" => StatusEffectKind::StoneArmor,
        "undying" => StatusEffectKind::Undying,
        "lifeBond" => StatusEffectKind::LifeBond,
        _ => return None,
    };
    Some(catalog.build_effect(kind, None, None, None))
}
