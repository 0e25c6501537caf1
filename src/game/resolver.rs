use rand::Rng;

use crate::content::ContentCatalog;
use crate::game::GameConfig;
use crate::game::bus::{EmitOptions, EventBus};
use crate::game::effects::{StatusEffectKind, TickClass};
use crate::game::event::{EventKind, EventPayload, MONSTER_TARGET, Winner};
use crate::game::phase::{PassiveActivation, PhaseController};
use crate::game::processor::CommandProcessor;
use crate::game::state::GameState;
use crate::game::trophies::compute_trophies;

pub struct ResolveOutcome {
    /// Set when the round resolved the whole game.
    pub ended: Option<Winner>,
    /// Whether this call actually performed the resolution (false on a
    /// repeated trigger within the same round).
    pub resolved: bool,
}

/// The ordered action → results sequence. Partial failures inside a step
/// are reported on the event stream; the round always advances.
#[allow(clippy::too_many_arguments)]
pub fn resolve_round<R: Rng>(
    state: &mut GameState,
    phase: &mut PhaseController,
    processor: &mut CommandProcessor,
    bus: &mut EventBus,
    catalog: &dyn ContentCatalog,
    config: &GameConfig,
    rng: &mut R,
    reason: &str,
) -> ResolveOutcome {
    // 1. Atomic phase flip; repeated triggers within the round are no-ops.
    if !phase.begin_resolution(reason, bus) {
        return ResolveOutcome { ended: None, resolved: false };
    }
    log::debug!("[{}] resolving round {} ({reason})", state.code, phase.round());

    // Cooldowns decrement at the resolution boundary, so an ability used on
    // round r with cooldown c frees up on round r + c + 1.
    for id in state.player_ids() {
        if let Some(player) = state.player_mut(&id) {
            player.tick_cooldowns();
        }
    }

    // 2. Start-of-resolution passives queued by the previous round.
    for activation in phase.get_pending_passive_activations() {
        apply_passive(state, bus, &activation);
    }

    // 3. Player commands, in priority order.
    let report = processor.process_commands(state, phase, bus, catalog);
    roll_corruption(state, bus, config, rng, report.corruption_attempts);

    // 4. The monster strikes its top-threat target.
    monster_action(state, bus, catalog, rng);

    // 5. Status ticks: damage, then healing, then death triggers.
    tick_status_effects(state, bus, catalog);

    // Queue next round's life-bond regeneration off the monster's remaining
    // vigor.
    queue_life_bond(state, phase);

    // 6. Surface disconnects that happened during the action phase.
    for record in phase.get_pending_disconnect_events() {
        bus.emit(
            EventKind::PlayerDisconnected,
            EventPayload::PlayerDisconnected {
                player_id: record.player_id,
                round: record.round,
            },
            EmitOptions::default(),
        );
    }

    // 7. Monster death pays out a level before the victory check.
    if state.monster.as_ref().is_some_and(|m| !m.is_alive()) {
        let new_level = (state.level + 1).min(4);
        state.level = new_level;
        state.refresh_unlocks(catalog);
        bus.emit(
            EventKind::MonsterDied,
            EventPayload::MonsterDied {
                round: phase.round(),
                new_level,
            },
            EmitOptions::default(),
        );
        if let Some(monster) = state.monster.as_mut() {
            monster.respawn(new_level);
        }
    }

    if let Some(winner) = victory_check(state) {
        let trophies = compute_trophies(state);
        bus.emit(
            EventKind::GameEnded,
            EventPayload::GameEnded {
                winner,
                rounds: phase.round(),
                survivors: state.living_ids(),
                trophies,
            },
            EmitOptions::default(),
        );
        phase.end_game(bus);
        return ResolveOutcome { ended: Some(winner), resolved: true };
    }

    // 8. Round bookkeeping; the results → action transition itself waits on
    // the ready flow.
    if let Some(monster) = state.monster.as_mut() {
        monster.age_round();
    }
    bus.emit(
        EventKind::PlayerStatusUpdated,
        EventPayload::PlayerStatusUpdated {
            players: state.public_roster(),
        },
        EmitOptions::default(),
    );

    ResolveOutcome { ended: None, resolved: true }
}

fn apply_passive(state: &mut GameState, bus: &mut EventBus, activation: &PassiveActivation) {
    match activation.effect.tick_class() {
        TickClass::Healing => {
            state.heal_player(
                bus,
                &activation.player_id,
                activation.amount.max(0) as u32,
                None,
                Some(activation.effect.as_str()),
            );
        }
        TickClass::Damage => {
            state.plain_damage_player(
                bus,
                &activation.player_id,
                activation.amount.max(0) as u32,
                None,
            );
        }
        _ => {}
    }
}

fn roll_corruption<R: Rng>(
    state: &mut GameState,
    bus: &mut EventBus,
    config: &GameConfig,
    rng: &mut R,
    attempts: Vec<(String, String)>,
) {
    // At most one conversion per round keeps the evil side's growth bounded.
    for (target, converter) in attempts {
        let eligible = state
            .player(&target)
            .is_some_and(|p| p.is_alive && !p.is_warlock);
        if !eligible {
            continue;
        }
        if !rng.gen_bool(config.conversion_chance.clamp(0.0, 1.0)) {
            continue;
        }
        if let Some(player) = state.player_mut(&target) {
            player.is_warlock = true;
        }
        bus.emit(
            EventKind::WarlockConverted,
            EventPayload::WarlockConverted {
                player_id: target,
                converter_id: Some(converter),
            },
            EmitOptions::default(),
        );
        break;
    }
}

fn monster_action<R: Rng>(
    state: &mut GameState,
    bus: &mut EventBus,
    catalog: &dyn ContentCatalog,
    rng: &mut R,
) {
    let Some(monster) = state.monster.as_ref() else {
        return;
    };
    if !monster.is_alive() {
        return;
    }
    let damage = monster.attack_damage();
    let living = state.living_ids();
    let Some(target) = monster.choose_target(&living, rng) else {
        return;
    };
    state.damage_player(bus, &target, damage, Some(MONSTER_TARGET), None, catalog);
    let monster_hp = state.monster.as_ref().map_or(0, |m| m.hp);
    bus.emit(
        EventKind::MonsterAttacked,
        EventPayload::MonsterAttacked {
            target_id: target,
            damage,
            monster_hp,
        },
        EmitOptions::default(),
    );
}

fn tick_status_effects(state: &mut GameState, bus: &mut EventBus, catalog: &dyn ContentCatalog) {
    let ids = state.player_ids();

    // Damage effects first.
    for id in &ids {
        let Some(player) = state.player(id) else { continue };
        if !player.is_alive {
            continue;
        }
        let ticks: Vec<(StatusEffectKind, u32)> = player
            .status_effects
            .iter()
            .filter(|e| e.kind.tick_class() == TickClass::Damage)
            .map(|e| (e.kind, e.magnitude.max(0) as u32))
            .collect();
        for (kind, amount) in ticks {
            state.plain_damage_player(bus, id, amount, None);
            log::trace!("[{}] {} ticks {amount} on {id}", state.code, kind.as_str());
        }
    }

    // Then healing effects.
    for id in &ids {
        let Some(player) = state.player(id) else { continue };
        if !player.is_alive {
            continue;
        }
        let ticks: Vec<(StatusEffectKind, u32)> = player
            .status_effects
            .iter()
            .filter(|e| {
                e.kind.tick_class() == TickClass::Healing && e.kind != StatusEffectKind::LifeBond
            })
            .map(|e| (e.kind, e.magnitude.max(0) as u32))
            .collect();
        for (kind, amount) in ticks {
            state.heal_player(bus, id, amount, None, Some(kind.as_str()));
        }
    }

    // Death triggers: undying brings its holder back once.
    for id in &ids {
        let undying = state
            .player(id)
            .is_some_and(|p| !p.is_alive && p.has_effect(StatusEffectKind::Undying));
        if !undying {
            continue;
        }
        let hp = catalog
            .status_effect_defaults(StatusEffectKind::Undying)
            .magnitude
            .max(1) as u32;
        if let Some(player) = state.player_mut(id) {
            player.resurrect(hp);
            player.status_effects.remove(StatusEffectKind::Undying);
        }
        bus.emit(
            EventKind::CombatEffectExpired,
            EventPayload::CombatEffectExpired {
                target_id: id.clone(),
                effect: StatusEffectKind::Undying,
            },
            EmitOptions::default(),
        );
    }

    // Finally, durations run down.
    for id in &ids {
        let Some(player) = state.player_mut(id) else { continue };
        let expired = player.status_effects.tick_durations();
        for kind in expired {
            bus.emit(
                EventKind::CombatEffectExpired,
                EventPayload::CombatEffectExpired {
                    target_id: id.clone(),
                    effect: kind,
                },
                EmitOptions::default(),
            );
        }
    }
}

fn queue_life_bond(state: &mut GameState, phase: &mut PhaseController) {
    let Some(monster) = state.monster.as_ref() else {
        return;
    };
    if !monster.is_alive() {
        return;
    }
    let monster_hp = monster.hp;
    let activations: Vec<PassiveActivation> = state
        .players()
        .filter(|p| p.is_alive)
        .filter_map(|p| {
            p.status_effects
                .get(StatusEffectKind::LifeBond)
                .map(|bond| PassiveActivation {
                    player_id: p.id.clone(),
                    effect: StatusEffectKind::LifeBond,
                    amount: (monster_hp * bond.magnitude.max(0) as u32 / 100).max(1) as i32,
                })
        })
        .collect();
    phase.add_pending_passive_activations(activations);
}

/// Good wins when every warlock is dead; Evil when the living good are
/// outnumbered-or-matched by living warlocks; Draw when nobody is left.
pub fn victory_check(state: &GameState) -> Option<Winner> {
    let living = state.living_count();
    let warlocks = state.living_warlocks();
    let good = state.living_good();
    if living == 0 {
        Some(Winner::Draw)
    } else if warlocks == 0 {
        Some(Winner::Good)
    } else if good <= warlocks {
        Some(Winner::Evil)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StaticCatalog;
    use crate::game::monster::MonsterConfig;
    use crate::game::player::Player;
    use crate::game::processor::ActionData;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixture {
        state: GameState,
        phase: PhaseController,
        bus: EventBus,
        catalog: StaticCatalog,
        processor: CommandProcessor,
        config: GameConfig,
        rng: StdRng,
    }

    fn fixture() -> Fixture {
        let catalog = StaticCatalog::default();
        let mut state = GameState::new("1234".into());
        let mut bus = EventBus::new("1234".into(), 512);
        for (i, (name, race, class)) in [
            ("Ada", "artisan", "pyromancer"),
            ("Brin", "orc", "warrior"),
            ("Cleo", "kinfolk", "priest"),
            ("Dag", "lich", "wizard"),
        ]
        .iter()
        .enumerate()
        {
            let id = format!("p{}", i + 1);
            state.add_player(Player::new(id.clone(), i as u64 + 1, name.to_string()));
            state.apply_selection(&id, race, class, &catalog);
        }
        state.spawn_monster(&MonsterConfig::default());
        // Without a living warlock the victory check would end every game
        // on the first resolution.
        state.player_mut("p2").unwrap().is_warlock = true;
        let mut phase = PhaseController::new();
        phase.start_game(&mut bus);
        Fixture {
            state,
            phase,
            bus,
            catalog,
            processor: CommandProcessor::new(),
            config: GameConfig::default(),
            rng: StdRng::seed_from_u64(7),
        }
    }

    fn resolve(f: &mut Fixture, reason: &str) -> ResolveOutcome {
        resolve_round(
            &mut f.state,
            &mut f.phase,
            &mut f.processor,
            &mut f.bus,
            &f.catalog,
            &f.config,
            &mut f.rng,
            reason,
        )
    }

    #[test]
    fn resolution_is_idempotent_within_a_round() {
        let mut f = fixture();
        assert!(resolve(&mut f, "timeout").resolved);
        assert!(!resolve(&mut f, "timeout").resolved);
        let transitions = f
            .bus
            .history(512)
            .iter()
            .filter(|e| e.kind == EventKind::PhaseChanged)
            .count();
        assert_eq!(transitions, 2); // lobby->action, action->results
    }

    #[test]
    fn monster_attacks_a_living_player() {
        let mut f = fixture();
        resolve(&mut f, "timeout");
        assert!(f
            .bus
            .history(512)
            .iter()
            .any(|e| e.kind == EventKind::MonsterAttacked));
        let total_hp: u32 = f.state.players().map(|p| p.hp).sum();
        let max_hp: u32 = f.state.players().map(|p| p.max_hp).sum();
        assert!(total_hp < max_hp);
    }

    #[test]
    fn poison_ticks_and_expires() {
        let mut f = fixture();
        let poison = f.catalog.build_effect(StatusEffectKind::Poison, None, Some(4), Some(1));
        f.state.player_mut("p1").unwrap().status_effects.apply(poison);
        let hp_before = f.state.player("p1").unwrap().hp;
        resolve(&mut f, "timeout");
        let p1 = f.state.player("p1").unwrap();
        assert!(p1.hp <= hp_before - 4);
        assert!(!p1.has_effect(StatusEffectKind::Poison));
        assert!(f
            .bus
            .history(512)
            .iter()
            .any(|e| e.kind == EventKind::CombatEffectExpired));
    }

    #[test]
    fn undying_resurrects_at_one_hp() {
        let mut f = fixture();
        // p4 is a lich; kill it via a big hit before resolution.
        f.state.plain_damage_player(&mut f.bus, "p4", 10_000, None);
        assert!(!f.state.player("p4").unwrap().is_alive);
        resolve(&mut f, "timeout");
        let p4 = f.state.player("p4").unwrap();
        assert!(p4.is_alive);
        assert!(p4.hp >= 1);
        assert!(!p4.has_effect(StatusEffectKind::Undying));
    }

    #[test]
    fn life_bond_heals_on_the_following_round() {
        let mut f = fixture();
        f.state.player_mut("p3").unwrap().hp = 50;
        resolve(&mut f, "timeout");
        f.phase.advance_round("allReady", &mut f.bus);
        let hp_before = f.state.player("p3").unwrap().hp;
        resolve(&mut f, "timeout");
        // Healed by the bond queued last round (the monster may also have
        // hit p3 afterwards; check the healing event directly).
        let healed = f.bus.history(512).iter().any(|e| {
            matches!(
                &e.payload,
                EventPayload::CombatHealingApplied { target_id, ability_id, .. }
                    if target_id == "p3" && ability_id.as_deref() == Some("lifeBond")
            )
        });
        assert!(healed, "expected a lifeBond heal for p3 (hp before {hp_before})");
    }

    #[test]
    fn good_wins_when_the_last_warlock_falls() {
        let mut f = fixture();
        f.state.player_mut("p2").unwrap().is_warlock = true;
        f.processor
            .submit_action_data(
                "p1",
                ActionData {
                    action_type: "fireball".into(),
                    target_id: Some("p2".into()),
                    ..ActionData::default()
                },
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        f.state.player_mut("p2").unwrap().hp = 1;
        let outcome = resolve(&mut f, "allSubmitted");
        assert_eq!(outcome.ended, Some(Winner::Good));
        let ended = f
            .bus
            .history(512)
            .iter()
            .any(|e| e.kind == EventKind::GameEnded);
        assert!(ended);
        assert_eq!(f.phase.phase(), crate::game::phase::GamePhase::Lobby);
    }

    #[test]
    fn evil_wins_on_parity() {
        let mut f = fixture();
        f.state.player_mut("p2").unwrap().is_warlock = true;
        // Two good players die; one good remains vs one warlock.
        f.state.plain_damage_player(&mut f.bus, "p3", 10_000, None);
        f.state.plain_damage_player(&mut f.bus, "p4", 10_000, None);
        f.state.player_mut("p4").unwrap().status_effects.remove(StatusEffectKind::Undying);
        assert_eq!(victory_check(&f.state), Some(Winner::Evil));
    }

    #[test]
    fn cooldown_window_matches_the_boundary_law() {
        let mut f = fixture();
        f.processor
            .submit_action_data(
                "p1",
                ActionData {
                    action_type: "fireball".into(),
                    target_id: Some(MONSTER_TARGET.into()),
                    ..ActionData::default()
                },
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        resolve(&mut f, "allSubmitted"); // round 1 resolves; cooldown 2 set

        for expect_blocked in [true, true, false] {
            f.phase.advance_round("allReady", &mut f.bus);
            let result = f.processor.submit_action_data(
                "p1",
                ActionData {
                    action_type: "fireball".into(),
                    target_id: Some(MONSTER_TARGET.into()),
                    ..ActionData::default()
                },
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            );
            assert_eq!(result.is_err(), expect_blocked, "round {}", f.phase.round());
            resolve(&mut f, "timeout");
        }
    }
}
