use std::collections::HashMap;

use serde::Deserialize;

use crate::content::catalog::{
    AbilityCategory, AbilityDef, AbilityTarget, ContentCatalog, EffectSpec, RaceAttributes,
    RacialAbilityDef, StatusEffectDefaults, UsageLimit,
};
use crate::content::dispatch::{DispatchRequest, DispatchTarget, EffectOutcome, TargetRef};
use crate::game::effects::StatusEffectKind;

/// Catalog backed by in-memory tables: the built-in content set, or any
/// JSON document with the same shape loaded at startup.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticCatalog {
    races: HashMap<String, RaceAttributes>,
    racials: HashMap<String, RacialAbilityDef>,
    classes: HashMap<String, Vec<AbilityDef>>,
    effect_defaults: HashMap<StatusEffectKind, StatusEffectDefaults>,
    base_hp: u32,
    coordination_bonus_per_ally: f64,
    /// Outgoing multiplier while enraged / blood-raged.
    rage_multiplier: f64,
    /// Hp an orc pays for blood rage.
    blood_rage_cost: u32,
}

impl StaticCatalog {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

fn ability(
    id: &str,
    name: &str,
    category: AbilityCategory,
    unlock_at: u32,
    priority: i32,
    target: AbilityTarget,
    cooldown: u32,
    base_amount: u32,
) -> AbilityDef {
    AbilityDef {
        id: id.to_string(),
        name: name.to_string(),
        category,
        unlock_at,
        priority,
        target,
        cooldown,
        can_target_dead: false,
        base_amount,
        effect: None,
        reveals_target: false,
        requires_health: None,
        requires_effect: None,
        prohibited_effects: Vec::new(),
        requires_class: None,
        requires_race: None,
    }
}

fn with_effect(mut def: AbilityDef, kind: StatusEffectKind, turns: i32, magnitude: i32) -> AbilityDef {
    def.effect = Some(EffectSpec { kind, turns, magnitude });
    def
}

fn race(hp: f64, armor: f64, damage: f64, classes: &[&str]) -> RaceAttributes {
    RaceAttributes {
        hp_modifier: hp,
        armor_modifier: armor,
        damage_modifier: damage,
        compatible_classes: classes.iter().map(|c| c.to_string()).collect(),
    }
}

fn racial(id: &str, name: &str, usage_limit: UsageLimit, max_uses: u32) -> RacialAbilityDef {
    RacialAbilityDef {
        id: id.to_string(),
        name: name.to_string(),
        usage_limit,
        max_uses,
        cooldown: 0,
        params: serde_json::Value::Null,
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        use AbilityCategory::*;
        use AbilityTarget::*;
        use StatusEffectKind as E;

        let mut classes = HashMap::new();
        classes.insert(
            "warrior".to_string(),
            vec![
                ability("slash", "Slash", Attack, 1, 10, Any, 0, 12),
                with_effect(ability("shieldWall", "Shield Wall", Defense, 2, 40, Slf, 2, 0), E::Shielded, 2, 15),
                with_effect(ability("battleCry", "Battle Cry", Special, 3, 35, Slf, 3, 0), E::Enraged, 2, 50),
                {
                    let mut def = ability("execute", "Execute", Attack, 4, 8, Any, 3, 26);
                    def.requires_health = Some(crate::content::catalog::HealthRequirement::Absolute(10));
                    def
                },
            ],
        );
        classes.insert(
            "pyromancer".to_string(),
            vec![
                ability("fireball", "Fireball", Attack, 1, 10, Any, 2, 15),
                with_effect(ability("flameWard", "Flame Ward", Defense, 2, 40, Slf, 2, 0), E::Shielded, 2, 12),
                with_effect(ability("ignite", "Ignite", Special, 3, 20, Any, 2, 4), E::Poison, 3, 4),
                ability("inferno", "Inferno", Attack, 4, 9, Any, 4, 30),
            ],
        );
        classes.insert(
            "wizard".to_string(),
            vec![
                ability("magicMissile", "Magic Missile", Attack, 1, 10, Any, 0, 10),
                with_effect(ability("arcaneShield", "Arcane Shield", Defense, 2, 40, Slf, 2, 0), E::Shielded, 2, 10),
                with_effect(ability("slow", "Slow", Special, 3, 30, Player, 2, 0), E::Weakened, 2, 25),
                ability("meteor", "Meteor", Attack, 4, 9, Any, 4, 28),
            ],
        );
        classes.insert(
            "assassin".to_string(),
            vec![
                ability("backstab", "Backstab", Attack, 1, 12, Any, 1, 14),
                with_effect(ability("vanish", "Vanish", Special, 2, 45, Slf, 3, 0), E::Invisible, 1, 0),
                with_effect(ability("poisonBlade", "Poison Blade", Special, 3, 20, Any, 2, 6), E::Poison, 3, 5),
                with_effect(ability("deathMark", "Death Mark", Attack, 4, 9, Player, 4, 22), E::Vulnerable, 2, 50),
            ],
        );
        classes.insert(
            "priest".to_string(),
            vec![
                ability("smite", "Smite", Attack, 1, 10, Any, 0, 8),
                ability("heal", "Heal", Heal, 2, 30, Player, 1, 15),
                with_effect(ability("renew", "Renew", Heal, 3, 28, Player, 2, 4), E::HealingOverTime, 3, 5),
                with_effect(ability("sanctuary", "Sanctuary", Defense, 4, 50, Player, 4, 0), E::Sanctuary, 1, 0),
            ],
        );
        classes.insert(
            "oracle".to_string(),
            vec![
                ability("fateBolt", "Fate Bolt", Attack, 1, 10, Any, 0, 9),
                {
                    let mut def = ability("trueSight", "True Sight", Special, 2, 25, Player, 3, 0);
                    def.reveals_target = true;
                    def
                },
                with_effect(ability("moonveil", "Moonveil", Defense, 3, 38, Player, 3, 0), E::Moonbeam, 2, 4),
                ability("judgment", "Judgment", Attack, 4, 9, Any, 3, 22),
            ],
        );

        let all = ["warrior", "pyromancer", "wizard", "assassin", "priest", "oracle"];
        let mut races = HashMap::new();
        races.insert("artisan".to_string(), race(1.0, 0.0, 1.0, &all));
        races.insert(
            "rockhewn".to_string(),
            race(1.2, 0.1, 0.9, &["warrior", "priest", "wizard", "pyromancer"]),
        );
        races.insert(
            "lich".to_string(),
            race(0.9, 0.0, 1.1, &["wizard", "pyromancer", "assassin", "oracle"]),
        );
        races.insert(
            "orc".to_string(),
            race(1.1, 0.05, 1.2, &["warrior", "assassin", "pyromancer", "priest"]),
        );
        races.insert(
            "crestfallen".to_string(),
            race(1.0, 0.0, 1.05, &["oracle", "assassin", "wizard", "priest"]),
        );
        races.insert(
            "kinfolk".to_string(),
            race(1.05, 0.05, 0.95, &["priest", "oracle", "warrior", "wizard"]),
        );

        let mut racials = HashMap::new();
        racials.insert("artisan".to_string(), racial("adaptability", "Adaptability", UsageLimit::PerGame, 1));
        racials.insert("rockhewn".to_string(), racial("stoneArmor", "Stone Armor", UsageLimit::Passive, 0));
        racials.insert("lich".to_string(), racial("undying", "Undying", UsageLimit::Passive, 0));
        racials.insert("orc".to_string(), racial("bloodRage", "Blood Rage", UsageLimit::PerGame, 3));
        racials.insert("crestfallen".to_string(), racial("keenSenses", "Keen Senses", UsageLimit::PerGame, 2));
        racials.insert("kinfolk".to_string(), racial("lifeBond", "Life Bond", UsageLimit::Passive, 0));

        let mut effect_defaults = HashMap::new();
        let def = |turns, stackable, refreshable, magnitude| StatusEffectDefaults {
            turns,
            stackable,
            refreshable,
            magnitude,
        };
        effect_defaults.insert(E::Poison, def(3, false, true, 5));
        effect_defaults.insert(E::Bleed, def(2, true, false, 3));
        effect_defaults.insert(E::Shielded, def(2, false, true, 10));
        effect_defaults.insert(E::Invisible, def(1, false, true, 0));
        effect_defaults.insert(E::Stunned, def(1, false, false, 0));
        effect_defaults.insert(E::Vulnerable, def(2, false, true, 50));
        effect_defaults.insert(E::Weakened, def(2, false, true, 25));
        effect_defaults.insert(E::Enraged, def(1, false, true, 50));
        effect_defaults.insert(E::HealingOverTime, def(3, false, true, 5));
        effect_defaults.insert(E::StoneArmor, def(-1, false, false, 3));
        effect_defaults.insert(E::Undying, def(-1, false, false, 1));
        effect_defaults.insert(E::Moonbeam, def(2, false, true, 4));
        effect_defaults.insert(E::LifeBond, def(-1, false, false, 5));
        effect_defaults.insert(E::SpiritGuard, def(2, false, true, 5));
        effect_defaults.insert(E::Sanctuary, def(1, false, false, 0));

        Self {
            races,
            racials,
            classes,
            effect_defaults,
            base_hp: 100,
            coordination_bonus_per_ally: 0.15,
            rage_multiplier: 1.5,
            blood_rage_cost: 5,
        }
    }
}

impl StaticCatalog {
    /// Outgoing amount after attacker-side modifiers. Defensive adjustments
    /// (armor, shields, vulnerability) are applied where damage lands.
    fn scaled_amount(&self, request: &DispatchRequest<'_>, offensive: bool) -> u32 {
        let mut amount = f64::from(request.ability.base_amount);

        if offensive {
            if let Some(race) = request.actor.race.as_deref()
                && let Some(attrs) = self.races.get(race)
            {
                amount *= attrs.damage_modifier;
            }
            if request.actor.status_effects.has(StatusEffectKind::Enraged) {
                let boost = request.actor.status_effects.magnitude_of(StatusEffectKind::Enraged);
                amount *= 1.0 + f64::from(boost) / 100.0;
            }
            if request.actor.status_effects.has(StatusEffectKind::Weakened) {
                let cut = request.actor.status_effects.magnitude_of(StatusEffectKind::Weakened);
                amount *= (1.0 - f64::from(cut) / 100.0).max(0.0);
            }
            if request.racial.blood_rage {
                amount *= self.rage_multiplier;
            }
        }

        if request.coordination.allies_on_target > 1 {
            let extra = (request.coordination.allies_on_target - 1) as f64;
            amount *= 1.0 + self.coordination_bonus_per_ally * extra;
        }

        amount.round() as u32
    }

    fn corruption_outcomes(&self, request: &DispatchRequest<'_>, outcomes: &mut Vec<EffectOutcome>) {
        if !request.actor.is_warlock {
            return;
        }
        if let Some(target) = request.target.player()
            && target.is_alive
            && !target.is_warlock
        {
            outcomes.push(EffectOutcome::CorruptionChance {
                target: target.id.clone(),
                converter: request.actor.id.clone(),
            });
        }
    }
}

impl ContentCatalog for StaticCatalog {
    fn races(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.races.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn race_attributes(&self, race: &str) -> Option<&RaceAttributes> {
        self.races.get(race)
    }

    fn racial_ability(&self, race: &str) -> Option<&RacialAbilityDef> {
        self.racials.get(race)
    }

    fn class_abilities(&self, class: &str) -> Option<&[AbilityDef]> {
        self.classes.get(class).map(Vec::as_slice)
    }

    fn status_effect_defaults(&self, kind: StatusEffectKind) -> StatusEffectDefaults {
        self.effect_defaults
            .get(&kind)
            .copied()
            .unwrap_or(StatusEffectDefaults {
                turns: 1,
                stackable: false,
                refreshable: false,
                magnitude: 0,
            })
    }

    fn base_hp(&self) -> u32 {
        self.base_hp
    }

    fn coordination_bonus_per_ally(&self) -> f64 {
        self.coordination_bonus_per_ally
    }

    fn dispatch_ability(&self, request: DispatchRequest<'_>) -> Vec<EffectOutcome> {
        let mut outcomes = Vec::new();
        let Some(target_ref) = request.target.target_ref() else {
            return outcomes;
        };
        let actor_id = request.actor.id.clone();

        match request.ability.category {
            AbilityCategory::Attack | AbilityCategory::Special => {
                if request.ability.base_amount > 0 {
                    let amount = self.scaled_amount(&request, true);
                    outcomes.push(EffectOutcome::Damage {
                        target: target_ref.clone(),
                        amount,
                    });
                    if matches!(target_ref, TargetRef::Monster) {
                        outcomes.push(EffectOutcome::AddThreat {
                            player_id: actor_id.clone(),
                            amount,
                        });
                    }
                    if request.racial.blood_rage {
                        outcomes.push(EffectOutcome::Damage {
                            target: TargetRef::Player(actor_id.clone()),
                            amount: self.blood_rage_cost,
                        });
                    }
                }
                if let Some(spec) = request.ability.effect {
                    outcomes.push(EffectOutcome::ApplyEffect {
                        target: target_ref.clone(),
                        effect: self.build_effect(
                            spec.kind,
                            Some(actor_id.clone()),
                            Some(spec.magnitude),
                            Some(spec.turns),
                        ),
                    });
                }
                // Keen senses stays private (the command reports to the
                // actor); only reveal-type abilities go public here.
                if request.ability.reveals_target
                    && let Some(target) = request.target.player()
                {
                    outcomes.push(EffectOutcome::RevealRole {
                        player_id: target.id.clone(),
                    });
                }
                self.corruption_outcomes(&request, &mut outcomes);
            }
            AbilityCategory::Heal => {
                let amount = self.scaled_amount(&request, false);
                outcomes.push(EffectOutcome::Heal {
                    target: target_ref.clone(),
                    amount,
                });
                if let Some(spec) = request.ability.effect {
                    outcomes.push(EffectOutcome::ApplyEffect {
                        target: target_ref.clone(),
                        effect: self.build_effect(
                            spec.kind,
                            Some(actor_id.clone()),
                            Some(spec.magnitude),
                            Some(spec.turns),
                        ),
                    });
                }
                self.corruption_outcomes(&request, &mut outcomes);
            }
            AbilityCategory::Defense => {
                let spec = request.ability.effect.unwrap_or(EffectSpec {
                    kind: StatusEffectKind::Shielded,
                    turns: 2,
                    magnitude: 10,
                });
                outcomes.push(EffectOutcome::ApplyEffect {
                    target: target_ref,
                    effect: self.build_effect(
                        spec.kind,
                        Some(actor_id),
                        Some(spec.magnitude),
                        Some(spec.turns),
                    ),
                });
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::dispatch::CoordinationInfo;
    use crate::game::player::{Player, RacialModifiers};

    fn actor(race: &str, class: &str) -> Player {
        let mut p = Player::new("p1".into(), 1, "Ada".into());
        p.race = Some(race.to_string());
        p.class = Some(class.to_string());
        p.hp = 100;
        p.max_hp = 100;
        p
    }

    #[test]
    fn every_race_has_attributes_and_a_racial() {
        let catalog = StaticCatalog::default();
        for race in catalog.races() {
            assert!(catalog.race_attributes(race).is_some());
            assert!(catalog.racial_ability(race).is_some(), "race {race} lacks a racial");
            let attrs = catalog.race_attributes(race).unwrap();
            for class in &attrs.compatible_classes {
                assert!(catalog.class_abilities(class).is_some(), "unknown class {class}");
            }
        }
    }

    #[test]
    fn class_abilities_are_ordered_by_unlock_level() {
        let catalog = StaticCatalog::default();
        for class in catalog.classes() {
            let abilities = catalog.class_abilities(class).unwrap();
            let mut last = 0;
            for a in abilities {
                assert!(a.unlock_at >= last, "{class}/{} out of order", a.id);
                last = a.unlock_at;
            }
        }
    }

    #[test]
    fn attack_dispatch_scales_with_race_damage() {
        let catalog = StaticCatalog::default();
        let orc = actor("orc", "warrior");
        let target = actor("artisan", "priest");
        let def = catalog.ability("warrior", "slash").unwrap();
        let outcomes = catalog.dispatch_ability(DispatchRequest {
            actor: &orc,
            target: DispatchTarget::Player(&target),
            ability: def,
            round: 1,
            coordination: CoordinationInfo::default(),
            racial: RacialModifiers::default(),
        });
        match &outcomes[0] {
            EffectOutcome::Damage { amount, .. } => assert_eq!(*amount, 14), // 12 * 1.2
            other => panic!("expected damage, got {other:?}"),
        }
    }

    #[test]
    fn warlock_touch_carries_a_corruption_chance() {
        let catalog = StaticCatalog::default();
        let mut warlock = actor("artisan", "priest");
        warlock.is_warlock = true;
        let target = actor("artisan", "warrior");
        let def = catalog.ability("priest", "heal").unwrap();
        let outcomes = catalog.dispatch_ability(DispatchRequest {
            actor: &warlock,
            target: DispatchTarget::Player(&target),
            ability: def,
            round: 1,
            coordination: CoordinationInfo::default(),
            racial: RacialModifiers::default(),
        });
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, EffectOutcome::CorruptionChance { .. })));
    }
}
