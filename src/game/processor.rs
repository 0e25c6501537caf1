use std::collections::HashMap;

use crate::content::ContentCatalog;
use crate::game::bus::{EmitOptions, EventBus};
use crate::game::command::{
    AbilityCommand, Command, CommandCtx, CommandStatus, CommandSummary, ExecCtx, GenericCommand,
    RacialAbilityCommand,
};
use crate::game::event::{EventKind, EventPayload};
use crate::game::phase::PhaseController;
use crate::game::player::{PlayerId, RacialModifiers};
use crate::game::state::GameState;

/// One decoded `performAction` payload.
#[derive(Clone, Debug, Default)]
pub struct ActionData {
    pub action_type: String,
    pub target_id: Option<String>,
    pub blood_rage: bool,
    pub keen_senses: bool,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessorStats {
    pub submitted: u64,
    pub executed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rounds_processed: u64,
}

/// What a resolution pass produced, including the corruption rolls the
/// resolver still owes.
#[derive(Default)]
pub struct ProcessReport {
    pub executed: Vec<CommandSummary>,
    pub failed: Vec<CommandSummary>,
    pub corruption_attempts: Vec<(PlayerId, PlayerId)>,
}

/// Owns the per-player command queues: validate on submit, re-validate and
/// execute in priority order during resolution.
pub struct CommandProcessor {
    queues: HashMap<PlayerId, Vec<Box<dyn Command>>>,
    /// Commands submitted while a resolution pass runs; they join the next
    /// round instead of the one being resolved.
    deferred: Vec<Box<dyn Command>>,
    processing: bool,
    next_seq: u64,
    stats: ProcessorStats,
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessor {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            deferred: Vec::new(),
            processing: false,
            next_seq: 0,
            stats: ProcessorStats::default(),
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn destroy(&mut self) {
        self.queues.clear();
        self.deferred.clear();
    }

    /// True while a resolution pass is draining the queues.
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn get_pending_commands(&self, player_id: Option<&str>) -> Vec<CommandSummary> {
        match player_id {
            Some(player_id) => self
                .queues
                .get(player_id)
                .map(|commands| commands.iter().map(|c| c.summary()).collect())
                .unwrap_or_default(),
            None => self
                .queues
                .values()
                .flatten()
                .map(|c| c.summary())
                .collect(),
        }
    }

    /// Whether the processor holds a live non-racial command for the player
    /// (the queue half of the submission-flag invariant).
    pub fn holds_action_for(&self, player_id: &str) -> bool {
        self.queues.get(player_id).is_some_and(|commands| {
            commands.iter().any(|c| {
                !c.is_racial()
                    && matches!(
                        c.status(),
                        CommandStatus::Validated | CommandStatus::Executing
                    )
            })
        })
    }

    fn reject(
        bus: &mut EventBus,
        player_id: &str,
        ability_id: Option<String>,
        errors: &[String],
    ) {
        bus.emit(
            EventKind::ActionRejected,
            EventPayload::ActionRejected {
                player_id: player_id.to_string(),
                reason: errors.join("; "),
                ability_id,
            },
            EmitOptions::default(),
        );
    }

    /// Classifies and queues one submitted action. Non-racial submissions
    /// replace any earlier non-executing command for the player; generic
    /// (phase-independent) actions apply immediately.
    pub fn submit_action_data(
        &mut self,
        player_id: &str,
        data: ActionData,
        state: &mut GameState,
        phase: &mut PhaseController,
        bus: &mut EventBus,
        catalog: &dyn ContentCatalog,
    ) -> Result<String, Vec<String>> {
        if state.terminal {
            return Err(vec!["This game is no longer accepting commands".to_string()]);
        }
        self.stats.submitted += 1;
        self.next_seq += 1;
        let seq = self.next_seq;

        if GenericCommand::is_generic_action(&data.action_type) {
            let mut command = GenericCommand::new(player_id.to_string(), data.action_type, seq);
            let valid = command.validate(&CommandCtx {
                state,
                phase,
                catalog,
            });
            if !valid {
                Self::reject(bus, player_id, None, command.validation_errors());
                return Err(command.validation_errors().to_vec());
            }
            let ready = command.action_type() == GenericCommand::READY;
            if ready {
                phase.set_player_ready(player_id);
            } else {
                phase.set_player_not_ready(player_id);
            }
            if let Some(player) = state.player_mut(player_id) {
                player.is_ready = ready;
            }
            return Ok(command.id().to_string());
        }

        let racial = RacialModifiers {
            blood_rage: data.blood_rage,
            keen_senses: data.keen_senses,
        };
        let mut command = AbilityCommand::new(
            player_id.to_string(),
            data.action_type,
            data.target_id,
            racial,
            seq,
        )
        .with_metadata(data.metadata);

        let valid = command.validate(&CommandCtx {
            state,
            phase,
            catalog,
        });
        if !valid {
            Self::reject(
                bus,
                player_id,
                Some(command.ability_key().to_string()),
                command.validation_errors(),
            );
            return Err(command.validation_errors().to_vec());
        }

        let command_id = command.id().to_string();
        if self.processing {
            self.deferred.push(Box::new(command));
            return Ok(command_id);
        }

        // Resubmission while the phase still permits: the old command is
        // cancelled and replaced, never duplicated.
        if let Some(queue) = self.queues.get_mut(player_id) {
            for old in queue.iter_mut().filter(|c| !c.is_racial()) {
                if old.cancel() {
                    self.stats.cancelled += 1;
                }
            }
            queue.retain(|c| c.status() != CommandStatus::Cancelled);
        }

        if let Err(reason) = phase.add_pending_action(command.pending_action()) {
            Self::reject(
                bus,
                player_id,
                Some(command.ability_key().to_string()),
                &[reason.clone()],
            );
            return Err(vec![reason]);
        }

        let payload = EventPayload::ActionSubmitted {
            player_id: player_id.to_string(),
            action_type: "ability".to_string(),
            target_id: command.target_id().map(str::to_string),
            ability_id: Some(command.ability_key().to_string()),
            command_id: Some(command_id.clone()),
        };
        self.queues
            .entry(player_id.to_string())
            .or_default()
            .push(Box::new(command));

        if let Some(player) = state.player_mut(player_id) {
            player.has_submitted_action = true;
            player.action_submission_time = Some(seq);
        }
        bus.emit(EventKind::ActionSubmitted, payload, EmitOptions::default());
        Ok(command_id)
    }

    /// Queues a standalone racial activation alongside the regular action.
    pub fn submit_racial_ability(
        &mut self,
        player_id: &str,
        racial_id: String,
        target_id: Option<String>,
        state: &mut GameState,
        phase: &mut PhaseController,
        bus: &mut EventBus,
        catalog: &dyn ContentCatalog,
    ) -> Result<String, Vec<String>> {
        if state.terminal {
            return Err(vec!["This game is no longer accepting commands".to_string()]);
        }
        self.stats.submitted += 1;
        self.next_seq += 1;
        let mut command =
            RacialAbilityCommand::new(player_id.to_string(), racial_id, target_id, self.next_seq);

        let valid = command.validate(&CommandCtx {
            state,
            phase,
            catalog,
        });
        if !valid {
            Self::reject(bus, player_id, None, command.validation_errors());
            return Err(command.validation_errors().to_vec());
        }

        let command_id = command.id().to_string();
        if let Err(reason) = phase.add_pending_racial_action(command.pending_action()) {
            Self::reject(bus, player_id, None, &[reason.clone()]);
            return Err(vec![reason]);
        }

        let payload = EventPayload::ActionSubmitted {
            player_id: player_id.to_string(),
            action_type: "racialAbility".to_string(),
            target_id: None,
            ability_id: None,
            command_id: Some(command_id.clone()),
        };
        self.queues
            .entry(player_id.to_string())
            .or_default()
            .push(Box::new(command));
        bus.emit(EventKind::ActionSubmitted, payload, EmitOptions::default());
        Ok(command_id)
    }

    /// Cancels one command if it is not currently executing.
    pub fn cancel_command(
        &mut self,
        command_id: &str,
        state: &mut GameState,
        phase: &mut PhaseController,
    ) -> bool {
        for (player_id, queue) in self.queues.iter_mut() {
            if let Some(command) = queue.iter_mut().find(|c| c.id() == command_id) {
                let was_racial = command.is_racial();
                if !command.cancel() {
                    return false;
                }
                self.stats.cancelled += 1;
                let player_id = player_id.clone();
                queue.retain(|c| c.status() != CommandStatus::Cancelled);
                if was_racial {
                    phase.remove_racial_pending_action(&player_id);
                } else {
                    phase.remove_regular_pending_action(&player_id);
                    if let Some(player) = state.player_mut(&player_id) {
                        player.clear_submission();
                    }
                }
                return true;
            }
        }
        false
    }

    /// Cancels everything a player has queued (disconnect handling).
    pub fn clear_player_commands(
        &mut self,
        player_id: &str,
        state: &mut GameState,
        phase: &mut PhaseController,
    ) -> usize {
        let mut cleared = 0;
        if let Some(queue) = self.queues.get_mut(player_id) {
            for command in queue.iter_mut() {
                if command.cancel() {
                    cleared += 1;
                    self.stats.cancelled += 1;
                }
            }
            queue.retain(|c| c.status() == CommandStatus::Executing);
        }
        phase.remove_pending_actions_for_player(player_id);
        if let Some(player) = state.player_mut(player_id) {
            player.clear_submission();
        }
        cleared
    }

    /// One-shot bulk execution on action → results. Each command is
    /// re-validated immediately before it runs, so state changed by earlier
    /// commands (a target dying, say) fails later ones instead of executing
    /// them against stale assumptions.
    pub fn process_commands(
        &mut self,
        state: &mut GameState,
        phase: &mut PhaseController,
        bus: &mut EventBus,
        catalog: &dyn ContentCatalog,
    ) -> ProcessReport {
        let mut report = ProcessReport::default();
        if self.processing {
            return report;
        }
        self.processing = true;

        let mut commands: Vec<Box<dyn Command>> = self
            .queues
            .drain()
            .flat_map(|(_, queue)| queue)
            .filter(|c| c.status() != CommandStatus::Cancelled)
            .collect();
        commands.sort_by_key(|c| (std::cmp::Reverse(c.priority()), c.submission_seq()));

        // Coordination is judged on the round's submissions as a whole, not
        // on what happens to execute first.
        let coordination = coordination_map(&commands_view(&commands));
        let bonus = catalog.coordination_bonus_per_ally();
        for (target, actors) in coordination.iter().filter(|(_, a)| a.len() > 1) {
            bus.emit(
                EventKind::CoordinationBonus,
                EventPayload::CoordinationBonus {
                    target_id: target.clone(),
                    actor_ids: actors.clone(),
                    multiplier: 1.0 + bonus * (actors.len() - 1) as f64,
                },
                EmitOptions::default(),
            );
        }

        let round = phase.round();
        for command in commands.iter_mut() {
            let revalidated = command.validate(&CommandCtx {
                state,
                phase,
                catalog,
            });
            if !revalidated {
                command.set_status(CommandStatus::Failed);
                self.stats.failed += 1;
                Self::reject(
                    bus,
                    command.player_id(),
                    None,
                    command.validation_errors(),
                );
                if !command.is_racial()
                    && let Some(player) = state.player_mut(command.player_id())
                {
                    player.clear_submission();
                }
                report.failed.push(command.summary());
                continue;
            }

            command.set_status(CommandStatus::Executing);
            let mut exec_ctx = ExecCtx {
                state: &mut *state,
                bus: &mut *bus,
                catalog,
                round,
                coordination: &coordination,
                corruption_attempts: &mut report.corruption_attempts,
            };
            match command.execute(&mut exec_ctx) {
                Ok(()) => {
                    command.set_status(CommandStatus::Completed);
                    self.stats.executed += 1;
                    if !command.is_racial() {
                        bus.emit(
                            EventKind::ActionExecuted,
                            EventPayload::ActionExecuted {
                                player_id: command.player_id().to_string(),
                                ability_id: command
                                    .summary()
                                    .ability_key
                                    .unwrap_or_else(|| command.action_type().to_string()),
                                target_id: command.summary().target_id,
                                round,
                            },
                            EmitOptions::default(),
                        );
                    }
                    report.executed.push(command.summary());
                }
                Err(error) => {
                    command.set_status(CommandStatus::Failed);
                    self.stats.failed += 1;
                    Self::reject(bus, command.player_id(), None, &[error.reason.clone()]);
                    report.failed.push(command.summary());
                }
            }
        }

        self.stats.rounds_processed += 1;
        self.processing = false;
        report
    }

    /// Re-queues commands that arrived mid-resolution, once the next action
    /// phase is open. Invalidated stragglers are rejected here.
    pub fn promote_deferred(
        &mut self,
        state: &mut GameState,
        phase: &mut PhaseController,
        bus: &mut EventBus,
        catalog: &dyn ContentCatalog,
    ) {
        let deferred = std::mem::take(&mut self.deferred);
        for mut command in deferred {
            let valid = command.validate(&CommandCtx {
                state,
                phase,
                catalog,
            });
            if !valid {
                Self::reject(bus, command.player_id(), None, command.validation_errors());
                continue;
            }
            if phase.add_pending_action(command.pending_action()).is_err() {
                continue;
            }
            if let Some(player) = state.player_mut(command.player_id()) {
                player.has_submitted_action = true;
                player.action_submission_time = Some(command.submission_seq());
            }
            bus.emit(
                EventKind::ActionSubmitted,
                EventPayload::ActionSubmitted {
                    player_id: command.player_id().to_string(),
                    action_type: command.action_type().to_string(),
                    target_id: command.summary().target_id,
                    ability_id: command.summary().ability_key,
                    command_id: Some(command.id().to_string()),
                },
                EmitOptions::default(),
            );
            self.queues
                .entry(command.player_id().to_string())
                .or_default()
                .push(command);
        }
    }
}

struct CommandView {
    actor: PlayerId,
    target: Option<String>,
    validated: bool,
}

fn commands_view(commands: &[Box<dyn Command>]) -> Vec<CommandView> {
    commands
        .iter()
        .map(|c| {
            let summary = c.summary();
            CommandView {
                actor: summary.player_id,
                target: summary.target_id,
                validated: matches!(
                    c.status(),
                    CommandStatus::Validated | CommandStatus::Executing | CommandStatus::Completed
                ),
            }
        })
        .collect()
}

/// Distinct actors per (non-self) target among live commands this round;
/// the coordination bonus multiplies where the count exceeds one.
fn coordination_map(commands: &[CommandView]) -> HashMap<String, Vec<PlayerId>> {
    let mut map: HashMap<String, Vec<PlayerId>> = HashMap::new();
    for view in commands.iter().filter(|v| v.validated) {
        let Some(target) = view.target.as_deref() else {
            continue;
        };
        if target == view.actor {
            continue;
        }
        let actors = map.entry(target.to_string()).or_default();
        if !actors.contains(&view.actor) {
            actors.push(view.actor.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StaticCatalog;
    use crate::game::event::MONSTER_TARGET;
    use crate::game::monster::MonsterConfig;
    use crate::game::player::Player;

    struct Fixture {
        state: GameState,
        phase: PhaseController,
        bus: EventBus,
        catalog: StaticCatalog,
        processor: CommandProcessor,
    }

    fn fixture() -> Fixture {
        let catalog = StaticCatalog::default();
        let mut state = GameState::new("1234".into());
        let mut bus = EventBus::new("1234".into(), 256);
        for (i, (name, race, class)) in [
            ("Ada", "artisan", "pyromancer"),
            ("Brin", "orc", "warrior"),
            ("Cleo", "crestfallen", "oracle"),
            ("Dag", "artisan", "priest"),
        ]
        .iter()
        .enumerate()
        {
            let id = format!("p{}", i + 1);
            state.add_player(Player::new(id.clone(), i as u64 + 1, name.to_string()));
            state.apply_selection(&id, race, class, &catalog);
        }
        state.spawn_monster(&MonsterConfig::default());
        let mut phase = PhaseController::new();
        phase.start_game(&mut bus);
        Fixture {
            state,
            phase,
            bus,
            catalog,
            processor: CommandProcessor::new(),
        }
    }

    fn action(action_type: &str, target: Option<&str>) -> ActionData {
        ActionData {
            action_type: action_type.to_string(),
            target_id: target.map(str::to_string),
            ..ActionData::default()
        }
    }

    #[test]
    fn submit_sets_flag_and_pending_action_together() {
        let mut f = fixture();
        let id = f
            .processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p2")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        assert!(!id.is_empty());
        assert!(f.state.player("p1").unwrap().has_submitted_action);
        assert!(f.phase.has_pending_action("p1"));
        assert!(f.processor.holds_action_for("p1"));
        assert!(f
            .bus
            .history(10)
            .iter()
            .any(|e| e.kind == EventKind::ActionSubmitted));
    }

    #[test]
    fn invalid_submission_is_rejected_and_not_queued() {
        let mut f = fixture();
        let result = f.processor.submit_action_data(
            "p1",
            action("inferno", Some("p2")), // not unlocked at level 1
            &mut f.state,
            &mut f.phase,
            &mut f.bus,
            &f.catalog,
        );
        assert!(result.is_err());
        assert!(!f.state.player("p1").unwrap().has_submitted_action);
        assert!(!f.processor.holds_action_for("p1"));
        assert!(f
            .bus
            .history(10)
            .iter()
            .any(|e| e.kind == EventKind::ActionRejected));
    }

    #[test]
    fn resubmission_replaces_the_previous_command() {
        let mut f = fixture();
        f.processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p2")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        f.processor
            .submit_action_data(
                "p1",
                action("magicMissile", Some("p3")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap_err(); // wizard ability, pyromancer actor

        // A failed replacement leaves the original in place.
        assert!(f.processor.holds_action_for("p1"));
        assert_eq!(f.processor.get_pending_commands(Some("p1")).len(), 1);

        f.processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p3")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();

        let pending = f.processor.get_pending_commands(Some("p1"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target_id.as_deref(), Some("p3"));
        assert_eq!(f.phase.pending_actions().len(), 1);
    }

    #[test]
    fn execution_order_is_priority_then_submission_time() {
        let mut f = fixture();
        // p1 attacks (priority 10), p4 heals p2 (priority 30): heal first.
        f.processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p2")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        f.state.level = 2;
        f.state.refresh_unlocks(&f.catalog);
        f.processor
            .submit_action_data(
                "p4",
                action("heal", Some("p2")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();

        f.phase.begin_resolution("allSubmitted", &mut f.bus);
        let report =
            f.processor
                .process_commands(&mut f.state, &mut f.phase, &mut f.bus, &f.catalog);
        assert_eq!(report.executed.len(), 2);
        assert_eq!(report.executed[0].player_id, "p4");
        assert_eq!(report.executed[1].player_id, "p1");
    }

    #[test]
    fn target_death_mid_round_fails_later_commands() {
        let mut f = fixture();
        f.state.player_mut("p3").unwrap().hp = 10;
        let dealt_before: u64 = f.state.player("p4").unwrap().stats.total_damage_dealt;

        f.processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p3")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        f.processor
            .submit_action_data(
                "p4",
                action("smite", Some("p3")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();

        f.phase.begin_resolution("allSubmitted", &mut f.bus);
        let report =
            f.processor
                .process_commands(&mut f.state, &mut f.phase, &mut f.bus, &f.catalog);

        // Both attacks have priority 10; p1 submitted first and kills p3.
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].player_id, "p4");
        assert!(!f.state.player("p3").unwrap().is_alive);
        assert_eq!(
            f.state.player("p4").unwrap().stats.total_damage_dealt,
            dealt_before
        );
        let rejected = f
            .bus
            .history(64)
            .iter()
            .filter(|e| e.kind == EventKind::ActionRejected)
            .count();
        assert_eq!(rejected, 1);
    }

    #[test]
    fn racial_actions_coexist_with_the_regular_action() {
        let mut f = fixture();
        f.processor
            .submit_action_data(
                "p2",
                action("slash", Some(MONSTER_TARGET)),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        f.processor
            .submit_racial_ability(
                "p2",
                "bloodRage".into(),
                None,
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        assert!(f.phase.has_pending_action("p2"));
        assert_eq!(f.phase.pending_racial_actions().len(), 1);

        f.phase.begin_resolution("allSubmitted", &mut f.bus);
        let report =
            f.processor
                .process_commands(&mut f.state, &mut f.phase, &mut f.bus, &f.catalog);
        assert_eq!(report.executed.len(), 2);
        // Racial priority (60) beats the slash (10), so the rage lands first
        // and boosts the attack.
        assert_eq!(report.executed[0].action_type, "racialAbility");
        assert_eq!(f.state.player("p2").unwrap().racial_uses_left, 2);
    }

    #[test]
    fn clearing_player_commands_restores_the_invariant() {
        let mut f = fixture();
        f.processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p2")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        let cleared = f
            .processor
            .clear_player_commands("p1", &mut f.state, &mut f.phase);
        assert_eq!(cleared, 1);
        assert!(!f.state.player("p1").unwrap().has_submitted_action);
        assert!(!f.phase.has_pending_action("p1"));
        assert!(!f.processor.holds_action_for("p1"));
    }

    #[test]
    fn coordination_counts_distinct_actors_per_target() {
        let views = vec![
            CommandView { actor: "p1".into(), target: Some("m".into()), validated: true },
            CommandView { actor: "p2".into(), target: Some("m".into()), validated: true },
            CommandView { actor: "p2".into(), target: Some("m".into()), validated: true },
            CommandView { actor: "p3".into(), target: Some("p3".into()), validated: true },
            CommandView { actor: "p4".into(), target: Some("m".into()), validated: false },
        ];
        let map = coordination_map(&views);
        assert_eq!(map.get("m").map(Vec::len), Some(2));
        assert!(!map.contains_key("p3"));
    }

    #[test]
    fn cancel_command_is_refused_only_mid_execution() {
        let mut f = fixture();
        let command_id = f
            .processor
            .submit_action_data(
                "p1",
                action("fireball", Some("p2")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        assert!(f.processor.cancel_command(&command_id, &mut f.state, &mut f.phase));
        assert!(!f.state.player("p1").unwrap().has_submitted_action);
        assert!(!f.phase.has_pending_action("p1"));
        // Unknown ids are a no-op.
        assert!(!f.processor.cancel_command("nope", &mut f.state, &mut f.phase));
    }

    #[test]
    fn monster_damage_earns_threat() {
        let mut f = fixture();
        f.processor
            .submit_action_data(
                "p1",
                action("fireball", Some("monster")),
                &mut f.state,
                &mut f.phase,
                &mut f.bus,
                &f.catalog,
            )
            .unwrap();
        f.phase.begin_resolution("allSubmitted", &mut f.bus);
        f.processor
            .process_commands(&mut f.state, &mut f.phase, &mut f.bus, &f.catalog);
        let monster = f.state.monster.as_ref().unwrap();
        assert!(monster.hp < monster.max_hp);
        assert!(monster.threat_of("p1") > 0);
    }
}
