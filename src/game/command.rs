use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::content::catalog::{AbilityDef, AbilityTarget, ContentCatalog, HealthRequirement};
use crate::content::dispatch::{
    CoordinationInfo, DispatchRequest, DispatchTarget, EffectOutcome, TargetRef,
};
use crate::game::bus::{EmitOptions, EventBus};
use crate::game::effects::StatusEffectKind;
use crate::game::event::{EventKind, EventPayload, MONSTER_TARGET};
use crate::game::phase::{GamePhase, PendingAction, PhaseController, ValidationState};
use crate::game::player::{PlayerId, RacialModifiers};
use crate::game::state::GameState;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandStatus {
    Pending,
    Validating,
    Validated,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct CommandError {
    pub reason: String,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for CommandError {}

/// Read-only view for (re)validation.
pub struct CommandCtx<'a> {
    pub state: &'a GameState,
    pub phase: &'a PhaseController,
    pub catalog: &'a dyn ContentCatalog,
}

/// Mutable view for execution. Corruption rolls are deferred to the caller
/// so commands stay free of randomness.
pub struct ExecCtx<'a> {
    pub state: &'a mut GameState,
    pub bus: &'a mut EventBus,
    pub catalog: &'a dyn ContentCatalog,
    pub round: u32,
    /// Normalized target key -> distinct actors aiming at it this round.
    pub coordination: &'a HashMap<String, Vec<PlayerId>>,
    /// (target, converter) pairs collected for the resolver to roll.
    pub corruption_attempts: &'a mut Vec<(PlayerId, PlayerId)>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub id: String,
    pub player_id: PlayerId,
    pub action_type: String,
    pub ability_key: Option<String>,
    pub target_id: Option<String>,
    pub status: CommandStatus,
    pub priority: i32,
    pub validation_errors: Vec<String>,
}

/// One attempted player input. Validation is decoupled from execution so
/// re-validation right before execution stays cheap.
pub trait Command: Send {
    fn id(&self) -> &str;
    fn player_id(&self) -> &str;
    fn action_type(&self) -> &str;
    fn status(&self) -> CommandStatus;
    fn set_status(&mut self, status: CommandStatus);
    fn priority(&self) -> i32;
    fn submission_seq(&self) -> u64;
    fn submission_time(&self) -> DateTime<Utc>;
    fn validation_errors(&self) -> &[String];

    fn is_racial(&self) -> bool {
        false
    }

    /// Idempotent; rebuilds the error list from current room state and
    /// promotes the status to `Validated` when it comes back clean.
    fn validate(&mut self, ctx: &CommandCtx<'_>) -> bool;

    /// Precondition: the latest `validate` passed and the processor moved
    /// the status to `Executing`.
    fn execute(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), CommandError>;

    /// Reverts captured undo state, if this command recorded any.
    fn undo(&mut self, _ctx: &mut ExecCtx<'_>) -> bool {
        false
    }

    /// Terminal from any non-executing state.
    fn cancel(&mut self) -> bool {
        if self.status() == CommandStatus::Executing {
            return false;
        }
        self.set_status(CommandStatus::Cancelled);
        true
    }

    fn summary(&self) -> CommandSummary;

    /// The phase-controller record mirroring this command.
    fn pending_action(&self) -> PendingAction;
}

/// `"monster"` and `"__monster__"` are the same canonical target.
pub fn normalize_target(target: Option<String>) -> Option<String> {
    target.map(|t| {
        if t == "monster" || t == MONSTER_TARGET {
            MONSTER_TARGET.to_string()
        } else {
            t
        }
    })
}

fn coordination_for<'a>(
    coordination: &'a HashMap<String, Vec<PlayerId>>,
    target_key: &str,
) -> CoordinationInfo {
    CoordinationInfo {
        allies_on_target: coordination.get(target_key).map_or(1, Vec::len).max(1),
    }
}

#[derive(Clone, Debug)]
struct UndoSnapshot {
    target: TargetRef,
    hp_before: u32,
}

/// A per-round class-ability use.
pub struct AbilityCommand {
    id: String,
    player_id: PlayerId,
    ability_key: String,
    target_id: Option<String>,
    racial: RacialModifiers,
    seq: u64,
    submitted_at: DateTime<Utc>,
    priority: i32,
    status: CommandStatus,
    errors: Vec<String>,
    can_undo: bool,
    undo_data: Vec<UndoSnapshot>,
    metadata: Option<serde_json::Value>,
}

impl AbilityCommand {
    pub fn new(
        player_id: PlayerId,
        ability_key: String,
        target_id: Option<String>,
        racial: RacialModifiers,
        seq: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            player_id,
            ability_key,
            target_id: normalize_target(target_id),
            racial,
            seq,
            submitted_at: Utc::now(),
            priority: 0,
            status: CommandStatus::Pending,
            errors: Vec::new(),
            can_undo: false,
            undo_data: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_undo(mut self) -> Self {
        self.can_undo = true;
        self
    }

    pub fn ability_key(&self) -> &str {
        &self.ability_key
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    fn resolve_def<'a>(&self, ctx: &CommandCtx<'a>) -> Option<&'a AbilityDef> {
        let class = ctx.state.player(&self.player_id)?.class.as_deref()?;
        ctx.catalog
            .ability(class, &self.ability_key)
            .or_else(|| ctx.catalog.find_ability(&self.ability_key))
    }

    fn check_prerequisites(&self, def: &AbilityDef, ctx: &CommandCtx<'_>, errors: &mut Vec<String>) {
        let Some(actor) = ctx.state.player(&self.player_id) else {
            return;
        };
        match def.requires_health {
            Some(HealthRequirement::Absolute(min)) if actor.hp < min => {
                errors.push(format!("{} requires at least {min} hp", def.id));
            }
            Some(HealthRequirement::Fraction(min)) if actor.health_percent() < min => {
                errors.push(format!("{} requires {}% health", def.id, (min * 100.0) as u32));
            }
            _ => {}
        }
        if let Some(required) = def.requires_effect
            && !actor.has_effect(required)
        {
            errors.push(format!("{} requires the {} effect", def.id, required.as_str()));
        }
        if actor.has_effect(StatusEffectKind::Stunned) {
            errors.push("Stunned players cannot act".to_string());
        }
        for prohibited in &def.prohibited_effects {
            if actor.has_effect(*prohibited) {
                errors.push(format!(
                    "{} cannot be used while {}",
                    def.id,
                    prohibited.as_str()
                ));
            }
        }
        if let Some(class) = def.requires_class.as_deref()
            && actor.class.as_deref() != Some(class)
        {
            errors.push(format!("{} requires the {class} class", def.id));
        }
        if let Some(race) = def.requires_race.as_deref()
            && actor.race.as_deref() != Some(race)
        {
            errors.push(format!("{} requires the {race} race", def.id));
        }
    }

    fn check_racial_modifiers(&self, ctx: &CommandCtx<'_>, errors: &mut Vec<String>) {
        if !self.racial.blood_rage && !self.racial.keen_senses {
            return;
        }
        let Some(actor) = ctx.state.player(&self.player_id) else {
            return;
        };
        let racial_id = actor
            .race
            .as_deref()
            .and_then(|race| ctx.catalog.racial_ability(race))
            .map(|r| r.id.clone());
        if self.racial.blood_rage && racial_id.as_deref() != Some("bloodRage") {
            errors.push("Blood rage is not available to this race".to_string());
        }
        if self.racial.keen_senses && racial_id.as_deref() != Some("keenSenses") {
            errors.push("Keen senses is not available to this race".to_string());
        }
        if (self.racial.blood_rage || self.racial.keen_senses) && actor.racial_uses_left == 0 {
            errors.push("No racial ability uses remaining".to_string());
        }
    }

    fn check_target(&mut self, def: &AbilityDef, ctx: &CommandCtx<'_>, errors: &mut Vec<String>) {
        match def.target {
            AbilityTarget::Slf => {
                self.target_id = Some(self.player_id.clone());
            }
            AbilityTarget::Player | AbilityTarget::Monster | AbilityTarget::Any => {
                let Some(target) = self.target_id.as_deref() else {
                    errors.push(format!("{} requires a target", def.id));
                    return;
                };
                if target == MONSTER_TARGET {
                    if def.target == AbilityTarget::Player {
                        errors.push(format!("{} cannot target the monster", def.id));
                        return;
                    }
                    match ctx.state.monster.as_ref() {
                        Some(monster) if monster.is_alive() => {}
                        _ => errors.push("The monster is not a valid target".to_string()),
                    }
                    return;
                }
                if def.target == AbilityTarget::Monster {
                    errors.push(format!("{} can only target the monster", def.id));
                    return;
                }
                match ctx.state.player(target) {
                    None => errors.push(format!("Unknown target {target}")),
                    Some(player) if !player.is_alive && !def.can_target_dead => {
                        errors.push("Cannot target dead players".to_string());
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

impl Command for AbilityCommand {
    fn id(&self) -> &str {
        &self.id
    }

    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn action_type(&self) -> &str {
        "ability"
    }

    fn status(&self) -> CommandStatus {
        self.status
    }

    fn set_status(&mut self, status: CommandStatus) {
        self.status = status;
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn submission_seq(&self) -> u64 {
        self.seq
    }

    fn submission_time(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    fn validation_errors(&self) -> &[String] {
        &self.errors
    }

    fn validate(&mut self, ctx: &CommandCtx<'_>) -> bool {
        if self.status == CommandStatus::Pending {
            self.status = CommandStatus::Validating;
        }
        let mut errors = Vec::new();

        match ctx.state.player(&self.player_id) {
            None => errors.push(format!("Unknown player {}", self.player_id)),
            Some(actor) if !actor.is_alive => {
                errors.push("Dead players cannot act".to_string());
            }
            Some(_) => {}
        }
        if ctx.phase.phase() != GamePhase::Action {
            errors.push(format!(
                "Abilities cannot be used during the {} phase",
                ctx.phase.phase().as_str()
            ));
        }

        if errors.is_empty() {
            let unlocked = ctx
                .state
                .player(&self.player_id)
                .is_some_and(|p| p.unlocked_abilities.iter().any(|a| a == &self.ability_key));
            match self.resolve_def(ctx) {
                Some(def) if unlocked => {
                    let cooldown = ctx
                        .state
                        .player(&self.player_id)
                        .map_or(0, |p| p.cooldown_remaining(&self.ability_key));
                    if cooldown > 0 {
                        errors.push(format!(
                            "{} is on cooldown for {cooldown} more round(s)",
                            def.id
                        ));
                    }
                    let def = def.clone();
                    self.check_target(&def, ctx, &mut errors);
                    self.check_prerequisites(&def, ctx, &mut errors);
                    self.check_racial_modifiers(ctx, &mut errors);
                    self.priority = def.priority;
                }
                _ => errors.push(format!("Ability {} is not unlocked", self.ability_key)),
            }
        }

        self.errors = errors;
        if self.errors.is_empty() {
            self.status = CommandStatus::Validated;
            true
        } else {
            false
        }
    }

    fn execute(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), CommandError> {
        let target_key = self
            .target_id
            .clone()
            .unwrap_or_else(|| self.player_id.clone());
        let (outcomes, def_cooldown, keen_result) = {
            let actor = ctx.state.player(&self.player_id).ok_or(CommandError {
                reason: format!("Unknown player {}", self.player_id),
            })?;
            let class = actor.class.as_deref().ok_or(CommandError {
                reason: "Actor has no class".to_string(),
            })?;
            let def = ctx
                .catalog
                .ability(class, &self.ability_key)
                .or_else(|| ctx.catalog.find_ability(&self.ability_key))
                .ok_or(CommandError {
                    reason: format!("Unknown ability {}", self.ability_key),
                })?;

            let target = if target_key == MONSTER_TARGET {
                match ctx.state.monster.as_ref() {
                    Some(monster) => DispatchTarget::Monster(monster),
                    None => {
                        return Err(CommandError {
                            reason: "The monster is gone".to_string(),
                        });
                    }
                }
            } else {
                match ctx.state.player(&target_key) {
                    Some(player) => DispatchTarget::Player(player),
                    None => {
                        return Err(CommandError {
                            reason: format!("Unknown target {target_key}"),
                        });
                    }
                }
            };

            let keen_result = if self.racial.keen_senses {
                target.player().map(|p| (p.id.clone(), p.is_warlock))
            } else {
                None
            };

            let outcomes = ctx.catalog.dispatch_ability(DispatchRequest {
                actor,
                target,
                ability: def,
                round: ctx.round,
                coordination: coordination_for(ctx.coordination, &target_key),
                racial: self.racial,
            });
            (outcomes, def.cooldown, keen_result)
        };

        if self.can_undo {
            self.undo_data = capture_undo(ctx.state, &outcomes);
        }

        apply_outcomes(ctx, &outcomes, &self.player_id, Some(&self.ability_key));

        if let Some((target, is_warlock)) = keen_result {
            ctx.bus.emit(
                EventKind::ActionRacialAbility,
                EventPayload::ActionRacialAbility {
                    player_id: self.player_id.clone(),
                    ability_id: "keenSenses".to_string(),
                    target_id: Some(target),
                    result: Some(if is_warlock { "warlock" } else { "good" }.to_string()),
                },
                EmitOptions::default(),
            );
        }

        if let Some(actor) = ctx.state.player_mut(&self.player_id) {
            actor.set_cooldown(&self.ability_key, def_cooldown);
            actor.stats.abilities_used += 1;
            if self.racial.blood_rage || self.racial.keen_senses {
                actor.racial_uses_left = actor.racial_uses_left.saturating_sub(1);
                actor.racial_used_this_round = true;
            }
        }
        Ok(())
    }

    fn undo(&mut self, ctx: &mut ExecCtx<'_>) -> bool {
        if !self.can_undo || self.undo_data.is_empty() {
            return false;
        }
        for snapshot in self.undo_data.drain(..) {
            match snapshot.target {
                TargetRef::Player(id) => {
                    if let Some(player) = ctx.state.player_mut(&id) {
                        player.hp = snapshot.hp_before.min(player.max_hp);
                        if player.hp > 0 {
                            player.is_alive = true;
                        }
                    }
                }
                TargetRef::Monster => {
                    if let Some(monster) = ctx.state.monster.as_mut() {
                        monster.hp = snapshot.hp_before.min(monster.max_hp);
                    }
                }
            }
        }
        true
    }

    fn summary(&self) -> CommandSummary {
        CommandSummary {
            id: self.id.clone(),
            player_id: self.player_id.clone(),
            action_type: "ability".to_string(),
            ability_key: Some(self.ability_key.clone()),
            target_id: self.target_id.clone(),
            status: self.status,
            priority: self.priority,
            validation_errors: self.errors.clone(),
        }
    }

    fn pending_action(&self) -> PendingAction {
        PendingAction {
            actor_id: self.player_id.clone(),
            action_type: "ability".to_string(),
            ability_key: Some(self.ability_key.clone()),
            target_id: self.target_id.clone(),
            racial_modifiers: self.racial,
            submission_seq: self.seq,
            submission_time: self.submitted_at,
            priority: self.priority,
            validation_state: match self.status {
                CommandStatus::Validated => ValidationState::Valid,
                CommandStatus::Failed => ValidationState::Invalid,
                _ => ValidationState::Revalidate,
            },
            command_id: self.id.clone(),
        }
    }
}

/// A standalone racial ability use, queued next to (not instead of) the
/// per-round action.
pub struct RacialAbilityCommand {
    id: String,
    player_id: PlayerId,
    racial_id: String,
    target_id: Option<String>,
    seq: u64,
    submitted_at: DateTime<Utc>,
    status: CommandStatus,
    errors: Vec<String>,
}

impl RacialAbilityCommand {
    pub fn new(player_id: PlayerId, racial_id: String, target_id: Option<String>, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            player_id,
            racial_id,
            target_id: normalize_target(target_id),
            seq,
            submitted_at: Utc::now(),
            status: CommandStatus::Pending,
            errors: Vec::new(),
        }
    }
}

impl Command for RacialAbilityCommand {
    fn id(&self) -> &str {
        &self.id
    }

    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn action_type(&self) -> &str {
        "racialAbility"
    }

    fn status(&self) -> CommandStatus {
        self.status
    }

    fn set_status(&mut self, status: CommandStatus) {
        self.status = status;
    }

    fn priority(&self) -> i32 {
        // Racial activations resolve ahead of class abilities.
        60
    }

    fn submission_seq(&self) -> u64 {
        self.seq
    }

    fn submission_time(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    fn validation_errors(&self) -> &[String] {
        &self.errors
    }

    fn is_racial(&self) -> bool {
        true
    }

    fn validate(&mut self, ctx: &CommandCtx<'_>) -> bool {
        if self.status == CommandStatus::Pending {
            self.status = CommandStatus::Validating;
        }
        let mut errors = Vec::new();

        let actor = ctx.state.player(&self.player_id);
        match actor {
            None => errors.push(format!("Unknown player {}", self.player_id)),
            Some(actor) if !actor.is_alive => errors.push("Dead players cannot act".to_string()),
            Some(actor) => {
                let racial = actor
                    .race
                    .as_deref()
                    .and_then(|race| ctx.catalog.racial_ability(race));
                match racial {
                    Some(def) if def.id == self.racial_id => {
                        if matches!(def.usage_limit, crate::content::UsageLimit::Passive) {
                            errors.push(format!("{} is passive", self.racial_id));
                        }
                        if actor.racial_uses_left == 0 {
                            errors.push("No racial ability uses remaining".to_string());
                        }
                        if actor.racial_used_this_round {
                            errors.push("Racial ability already used this round".to_string());
                        }
                    }
                    _ => errors.push(format!(
                        "{} is not this player's racial ability",
                        self.racial_id
                    )),
                }
                if actor.has_effect(StatusEffectKind::Stunned) {
                    errors.push("Stunned players cannot act".to_string());
                }
            }
        }
        if ctx.phase.phase() != GamePhase::Action {
            errors.push(format!(
                "Racial abilities cannot be used during the {} phase",
                ctx.phase.phase().as_str()
            ));
        }
        if self.racial_id == "keenSenses" {
            match self.target_id.as_deref() {
                None => errors.push("keenSenses requires a target".to_string()),
                Some(MONSTER_TARGET) => {
                    errors.push("keenSenses cannot target the monster".to_string())
                }
                Some(target) => match ctx.state.player(target) {
                    None => errors.push(format!("Unknown target {target}")),
                    Some(p) if !p.is_alive => errors.push("Cannot target dead players".to_string()),
                    Some(_) => {}
                },
            }
        }

        self.errors = errors;
        if self.errors.is_empty() {
            self.status = CommandStatus::Validated;
            true
        } else {
            false
        }
    }

    fn execute(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), CommandError> {
        let mut result = None;
        match self.racial_id.as_str() {
            "bloodRage" => {
                let effect = ctx.catalog.build_effect(
                    StatusEffectKind::Enraged,
                    Some(self.player_id.clone()),
                    None,
                    None,
                );
                ctx.state
                    .apply_effect_to_player(ctx.bus, &self.player_id.clone(), effect);
            }
            "keenSenses" => {
                let target = self.target_id.clone().ok_or(CommandError {
                    reason: "keenSenses requires a target".to_string(),
                })?;
                let is_warlock = ctx.state.player(&target).map(|p| p.is_warlock);
                match is_warlock {
                    Some(is_warlock) => {
                        result = Some(if is_warlock { "warlock" } else { "good" }.to_string());
                    }
                    None => {
                        return Err(CommandError {
                            reason: format!("Unknown target {target}"),
                        });
                    }
                }
            }
            other => {
                return Err(CommandError {
                    reason: format!("Racial ability {other} has no active use"),
                });
            }
        }

        if let Some(actor) = ctx.state.player_mut(&self.player_id) {
            actor.racial_uses_left = actor.racial_uses_left.saturating_sub(1);
            actor.racial_used_this_round = true;
        }

        ctx.bus.emit(
            EventKind::ActionRacialAbility,
            EventPayload::ActionRacialAbility {
                player_id: self.player_id.clone(),
                ability_id: self.racial_id.clone(),
                target_id: self.target_id.clone(),
                result,
            },
            EmitOptions::default(),
        );
        Ok(())
    }

    fn summary(&self) -> CommandSummary {
        CommandSummary {
            id: self.id.clone(),
            player_id: self.player_id.clone(),
            action_type: "racialAbility".to_string(),
            ability_key: Some(self.racial_id.clone()),
            target_id: self.target_id.clone(),
            status: self.status,
            priority: self.priority(),
            validation_errors: self.errors.clone(),
        }
    }

    fn pending_action(&self) -> PendingAction {
        PendingAction {
            actor_id: self.player_id.clone(),
            action_type: "racialAbility".to_string(),
            ability_key: Some(self.racial_id.clone()),
            target_id: self.target_id.clone(),
            racial_modifiers: RacialModifiers::default(),
            submission_seq: self.seq,
            submission_time: self.submitted_at,
            priority: self.priority(),
            validation_state: match self.status {
                CommandStatus::Validated => ValidationState::Valid,
                CommandStatus::Failed => ValidationState::Invalid,
                _ => ValidationState::Revalidate,
            },
            command_id: self.id.clone(),
        }
    }
}

/// Phase-independent inputs (ready / not-ready). Valid for dead players and
/// executed immediately on submit rather than queued for resolution.
pub struct GenericCommand {
    id: String,
    player_id: PlayerId,
    action_type: String,
    seq: u64,
    submitted_at: DateTime<Utc>,
    status: CommandStatus,
    errors: Vec<String>,
}

impl GenericCommand {
    pub const READY: &'static str = "ready";
    pub const NOT_READY: &'static str = "notReady";

    pub fn new(player_id: PlayerId, action_type: String, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            player_id,
            action_type,
            seq,
            submitted_at: Utc::now(),
            status: CommandStatus::Pending,
            errors: Vec::new(),
        }
    }

    pub fn is_generic_action(action_type: &str) -> bool {
        action_type == Self::READY || action_type == Self::NOT_READY
    }
}

impl Command for GenericCommand {
    fn id(&self) -> &str {
        &self.id
    }

    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn action_type(&self) -> &str {
        &self.action_type
    }

    fn status(&self) -> CommandStatus {
        self.status
    }

    fn set_status(&mut self, status: CommandStatus) {
        self.status = status;
    }

    fn priority(&self) -> i32 {
        0
    }

    fn submission_seq(&self) -> u64 {
        self.seq
    }

    fn submission_time(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    fn validation_errors(&self) -> &[String] {
        &self.errors
    }

    fn validate(&mut self, ctx: &CommandCtx<'_>) -> bool {
        let mut errors = Vec::new();
        if !ctx.state.contains(&self.player_id) {
            errors.push(format!("Unknown player {}", self.player_id));
        }
        if !Self::is_generic_action(&self.action_type) {
            errors.push(format!("Unknown action type {}", self.action_type));
        }
        self.errors = errors;
        if self.errors.is_empty() {
            self.status = CommandStatus::Validated;
            true
        } else {
            false
        }
    }

    fn execute(&mut self, _ctx: &mut ExecCtx<'_>) -> Result<(), CommandError> {
        // Ready flags are applied by the processor at submit time; nothing
        // is deferred to resolution.
        Ok(())
    }

    fn summary(&self) -> CommandSummary {
        CommandSummary {
            id: self.id.clone(),
            player_id: self.player_id.clone(),
            action_type: self.action_type.clone(),
            ability_key: None,
            target_id: None,
            status: self.status,
            priority: 0,
            validation_errors: self.errors.clone(),
        }
    }

    fn pending_action(&self) -> PendingAction {
        PendingAction {
            actor_id: self.player_id.clone(),
            action_type: self.action_type.clone(),
            ability_key: None,
            target_id: None,
            racial_modifiers: RacialModifiers::default(),
            submission_seq: self.seq,
            submission_time: self.submitted_at,
            priority: 0,
            validation_state: ValidationState::Valid,
            command_id: self.id.clone(),
        }
    }
}

fn capture_undo(state: &GameState, outcomes: &[EffectOutcome]) -> Vec<UndoSnapshot> {
    let mut snapshots = Vec::new();
    for outcome in outcomes {
        let target = match outcome {
            EffectOutcome::Damage { target, .. } | EffectOutcome::Heal { target, .. } => target,
            _ => continue,
        };
        let hp_before = match target {
            TargetRef::Player(id) => state.player(id).map(|p| p.hp),
            TargetRef::Monster => state.monster.as_ref().map(|m| m.hp),
        };
        if let Some(hp_before) = hp_before {
            snapshots.push(UndoSnapshot {
                target: target.clone(),
                hp_before,
            });
        }
    }
    snapshots
}

/// Applies a dispatch's effect stream to room state, emitting the combat
/// events along the way.
pub fn apply_outcomes(
    ctx: &mut ExecCtx<'_>,
    outcomes: &[EffectOutcome],
    actor_id: &str,
    ability_id: Option<&str>,
) {
    for outcome in outcomes {
        match outcome {
            EffectOutcome::Damage { target, amount } => match target {
                TargetRef::Player(id) => {
                    ctx.state
                        .damage_player(ctx.bus, id, *amount, Some(actor_id), ability_id, ctx.catalog);
                }
                TargetRef::Monster => {
                    ctx.state.damage_monster(ctx.bus, *amount, Some(actor_id), ability_id);
                }
            },
            EffectOutcome::Heal { target, amount } => match target {
                TargetRef::Player(id) => {
                    ctx.state.heal_player(ctx.bus, id, *amount, Some(actor_id), ability_id);
                }
                TargetRef::Monster => {
                    ctx.state.heal_monster(ctx.bus, *amount, ability_id);
                }
            },
            EffectOutcome::ApplyEffect { target, effect } => match target {
                TargetRef::Player(id) => {
                    ctx.state.apply_effect_to_player(ctx.bus, id, effect.clone());
                }
                TargetRef::Monster => {
                    log::warn!("status effects on the monster are not supported; dropped");
                }
            },
            EffectOutcome::RemoveEffect { target, kind } => {
                if let TargetRef::Player(id) = target
                    && let Some(player) = ctx.state.player_mut(id)
                    && player.status_effects.remove(*kind)
                {
                    ctx.bus.emit(
                        EventKind::CombatEffectExpired,
                        EventPayload::CombatEffectExpired {
                            target_id: id.clone(),
                            effect: *kind,
                        },
                        EmitOptions::default(),
                    );
                }
            }
            EffectOutcome::AddThreat { player_id, amount } => {
                if let Some(monster) = ctx.state.monster.as_mut() {
                    monster.add_threat(player_id, *amount);
                }
            }
            EffectOutcome::RevealRole { player_id } => {
                if let Some(player) = ctx.state.player_mut(player_id) {
                    player.is_revealed = true;
                }
            }
            EffectOutcome::CorruptionChance { target, converter } => {
                ctx.corruption_attempts
                    .push((target.clone(), converter.clone()));
            }
        }
    }
}
