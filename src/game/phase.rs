use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::bus::{EmitOptions, EventBus};
use crate::game::effects::StatusEffectKind;
use crate::game::event::{EventKind, EventPayload};
use crate::game::player::{PlayerId, RacialModifiers};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Lobby,
    Action,
    Results,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Action => "action",
            Self::Results => "results",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationState {
    Valid,
    Invalid,
    Revalidate,
}

/// One recorded player input for the current round. At most one non-racial
/// entry per player; racial entries queue separately and may co-exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub actor_id: PlayerId,
    pub action_type: String,
    pub ability_key: Option<String>,
    pub target_id: Option<String>,
    #[serde(default)]
    pub racial_modifiers: RacialModifiers,
    pub submission_seq: u64,
    pub submission_time: DateTime<Utc>,
    pub priority: i32,
    pub validation_state: ValidationState,
    pub command_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRecord {
    pub player_id: PlayerId,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

/// An effect queued during one resolution for emission in the next results
/// stream (round-start regeneration and the like).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassiveActivation {
    pub player_id: PlayerId,
    pub effect: StatusEffectKind,
    pub amount: i32,
}

/// Authoritative phase automaton plus the pending inputs of the current
/// round. Serializable as the warm-restart snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseController {
    phase: GamePhase,
    round: u32,
    /// Last round whose action→results transition ran; makes resolution
    /// triggers idempotent within a round.
    resolved_round: u32,
    pending_actions: Vec<PendingAction>,
    pending_racial_actions: Vec<PendingAction>,
    next_ready: BTreeSet<PlayerId>,
    pending_disconnect_events: Vec<DisconnectRecord>,
    pending_passive_activations: Vec<PassiveActivation>,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseController {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::Lobby,
            round: 1,
            resolved_round: 0,
            pending_actions: Vec::new(),
            pending_racial_actions: Vec::new(),
            next_ready: BTreeSet::new(),
            pending_disconnect_events: Vec::new(),
            pending_passive_activations: Vec::new(),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    fn transition(&mut self, to: GamePhase, reason: &str, bus: &mut EventBus) {
        let old = self.phase;
        self.phase = to;
        bus.emit(
            EventKind::PhaseChanged,
            EventPayload::PhaseChanged {
                old_phase: old,
                new_phase: to,
                round: self.round,
                reason: reason.to_string(),
                duration_ms: None,
            },
            EmitOptions::default(),
        );
    }

    fn reject_transition(&self, to: GamePhase, bus: &mut EventBus) {
        log::warn!(
            "illegal phase transition {} -> {} ignored",
            self.phase.as_str(),
            to.as_str()
        );
        bus.emit(
            EventKind::SystemWarning,
            EventPayload::SystemWarning {
                message: format!(
                    "illegal phase transition {} -> {}",
                    self.phase.as_str(),
                    to.as_str()
                ),
            },
            EmitOptions::default(),
        );
    }

    /// lobby → action, once the host starts the game.
    pub fn start_game(&mut self, bus: &mut EventBus) -> bool {
        if self.phase != GamePhase::Lobby {
            self.reject_transition(GamePhase::Action, bus);
            return false;
        }
        self.transition(GamePhase::Action, "gameStarted", bus);
        true
    }

    /// action → results. Exactly once per round: repeated triggers within
    /// the same round are no-ops.
    pub fn begin_resolution(&mut self, reason: &str, bus: &mut EventBus) -> bool {
        if self.phase != GamePhase::Action || self.resolved_round >= self.round {
            if self.phase != GamePhase::Action {
                self.reject_transition(GamePhase::Results, bus);
            }
            return false;
        }
        self.resolved_round = self.round;
        self.transition(GamePhase::Results, reason, bus);
        true
    }

    /// results → action: next round begins, per-round bookkeeping resets.
    pub fn advance_round(&mut self, reason: &str, bus: &mut EventBus) -> bool {
        if self.phase != GamePhase::Results {
            self.reject_transition(GamePhase::Action, bus);
            return false;
        }
        self.round += 1;
        self.reset_for_new_round();
        self.transition(GamePhase::Action, reason, bus);
        true
    }

    /// any → lobby when the game is over.
    pub fn end_game(&mut self, bus: &mut EventBus) -> bool {
        if self.phase == GamePhase::Lobby {
            self.reject_transition(GamePhase::Lobby, bus);
            return false;
        }
        self.transition(GamePhase::Lobby, "gameEnded", bus);
        true
    }

    /// Records a validated non-racial action. Rejected outside the action
    /// phase; replaces any earlier entry for the same actor.
    pub fn add_pending_action(&mut self, action: PendingAction) -> Result<(), String> {
        if self.phase != GamePhase::Action {
            return Err(format!(
                "actions are not accepted during the {} phase",
                self.phase.as_str()
            ));
        }
        self.pending_actions.retain(|a| a.actor_id != action.actor_id);
        self.pending_actions.push(action);
        Ok(())
    }

    pub fn add_pending_racial_action(&mut self, action: PendingAction) -> Result<(), String> {
        if self.phase != GamePhase::Action {
            return Err(format!(
                "racial actions are not accepted during the {} phase",
                self.phase.as_str()
            ));
        }
        self.pending_racial_actions
            .retain(|a| a.actor_id != action.actor_id);
        self.pending_racial_actions.push(action);
        Ok(())
    }

    /// Purges both queues for the player. The caller owns clearing the
    /// player's submission flag.
    pub fn remove_pending_actions_for_player(&mut self, player_id: &str) -> usize {
        let before = self.pending_actions.len() + self.pending_racial_actions.len();
        self.pending_actions.retain(|a| a.actor_id != player_id);
        self.pending_racial_actions.retain(|a| a.actor_id != player_id);
        before - self.pending_actions.len() - self.pending_racial_actions.len()
    }

    /// Purges only the regular (non-racial) entry, leaving a queued racial
    /// action untouched.
    pub fn remove_regular_pending_action(&mut self, player_id: &str) -> bool {
        let before = self.pending_actions.len();
        self.pending_actions.retain(|a| a.actor_id != player_id);
        self.pending_actions.len() != before
    }

    pub fn remove_racial_pending_action(&mut self, player_id: &str) -> bool {
        let before = self.pending_racial_actions.len();
        self.pending_racial_actions.retain(|a| a.actor_id != player_id);
        self.pending_racial_actions.len() != before
    }

    /// Rewrites actor and target references after an id change (reconnect
    /// with a new transport identity acting as the key).
    pub fn update_pending_action_targets(&mut self, old_id: &str, new_id: &str) -> usize {
        let mut rewritten = 0;
        for action in self
            .pending_actions
            .iter_mut()
            .chain(self.pending_racial_actions.iter_mut())
        {
            if action.actor_id == old_id {
                action.actor_id = new_id.to_string();
                rewritten += 1;
            }
            if action.target_id.as_deref() == Some(old_id) {
                action.target_id = Some(new_id.to_string());
                rewritten += 1;
            }
        }
        rewritten
    }

    pub fn pending_actions(&self) -> &[PendingAction] {
        &self.pending_actions
    }

    pub fn pending_racial_actions(&self) -> &[PendingAction] {
        &self.pending_racial_actions
    }

    pub fn has_pending_action(&self, player_id: &str) -> bool {
        self.pending_actions.iter().any(|a| a.actor_id == player_id)
    }

    pub fn set_player_ready(&mut self, player_id: &str) -> bool {
        self.next_ready.insert(player_id.to_string())
    }

    pub fn set_player_not_ready(&mut self, player_id: &str) -> bool {
        self.next_ready.remove(player_id)
    }

    pub fn is_ready(&self, player_id: &str) -> bool {
        self.next_ready.contains(player_id)
    }

    pub fn clear_ready(&mut self) {
        self.next_ready.clear();
    }

    pub fn ready_count(&self) -> usize {
        self.next_ready.len()
    }

    pub fn add_pending_disconnect_event(&mut self, record: DisconnectRecord) {
        self.pending_disconnect_events.push(record);
    }

    /// Drains the queue.
    pub fn get_pending_disconnect_events(&mut self) -> Vec<DisconnectRecord> {
        std::mem::take(&mut self.pending_disconnect_events)
    }

    pub fn add_pending_passive_activation(&mut self, activation: PassiveActivation) {
        self.pending_passive_activations.push(activation);
    }

    pub fn add_pending_passive_activations(&mut self, activations: Vec<PassiveActivation>) {
        self.pending_passive_activations.extend(activations);
    }

    /// Drains the queue.
    pub fn get_pending_passive_activations(&mut self) -> Vec<PassiveActivation> {
        std::mem::take(&mut self.pending_passive_activations)
    }

    /// Clears the per-round inputs. The disconnect and passive queues are
    /// preserved so the next results stream can carry them.
    pub fn reset_for_new_round(&mut self) {
        self.pending_actions.clear();
        self.pending_racial_actions.clear();
        self.next_ready.clear();
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Should always serialize the phase snapshot")
    }

    pub fn from_json(snapshot: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> EventBus {
        EventBus::new("1234".into(), 32)
    }

    fn pending(actor: &str, seq: u64) -> PendingAction {
        PendingAction {
            actor_id: actor.to_string(),
            action_type: "ability".into(),
            ability_key: Some("slash".into()),
            target_id: Some("p2".into()),
            racial_modifiers: RacialModifiers::default(),
            submission_seq: seq,
            submission_time: Utc::now(),
            priority: 10,
            validation_state: ValidationState::Valid,
            command_id: format!("cmd-{seq}"),
        }
    }

    #[test]
    fn happy_path_walks_the_automaton() {
        let mut controller = PhaseController::new();
        let mut bus = bus();
        assert_eq!(controller.phase(), GamePhase::Lobby);
        assert!(controller.start_game(&mut bus));
        assert!(controller.begin_resolution("allSubmitted", &mut bus));
        assert!(controller.advance_round("allReady", &mut bus));
        assert_eq!(controller.phase(), GamePhase::Action);
        assert_eq!(controller.round(), 2);
    }

    #[test]
    fn resolution_is_once_per_round() {
        let mut controller = PhaseController::new();
        let mut bus = bus();
        controller.start_game(&mut bus);
        assert!(controller.begin_resolution("timeout", &mut bus));
        assert!(!controller.begin_resolution("timeout", &mut bus));
        controller.advance_round("allReady", &mut bus);
        assert!(controller.begin_resolution("timeout", &mut bus));
    }

    #[test]
    fn illegal_transitions_are_noops_with_a_warning() {
        let mut controller = PhaseController::new();
        let mut bus = bus();
        assert!(!controller.advance_round("allReady", &mut bus));
        assert_eq!(controller.phase(), GamePhase::Lobby);
        let history = bus.history(10);
        assert!(history
            .iter()
            .any(|e| e.kind == EventKind::SystemWarning));
        assert!(!history.iter().any(|e| e.kind == EventKind::PhaseChanged));
    }

    #[test]
    fn pending_actions_require_the_action_phase() {
        let mut controller = PhaseController::new();
        assert!(controller.add_pending_action(pending("p1", 1)).is_err());
        let mut bus = bus();
        controller.start_game(&mut bus);
        assert!(controller.add_pending_action(pending("p1", 1)).is_ok());
        // A resubmission replaces, never duplicates.
        assert!(controller.add_pending_action(pending("p1", 2)).is_ok());
        assert_eq!(controller.pending_actions().len(), 1);
        assert_eq!(controller.pending_actions()[0].submission_seq, 2);
    }

    #[test]
    fn target_rewrite_touches_both_roles() {
        let mut controller = PhaseController::new();
        let mut bus = bus();
        controller.start_game(&mut bus);
        controller.add_pending_action(pending("p1", 1)).unwrap();
        let rewritten = controller.update_pending_action_targets("p2", "p2b");
        assert_eq!(rewritten, 1);
        assert_eq!(
            controller.pending_actions()[0].target_id.as_deref(),
            Some("p2b")
        );
        let rewritten = controller.update_pending_action_targets("p1", "p1b");
        assert_eq!(rewritten, 1);
        assert_eq!(controller.pending_actions()[0].actor_id, "p1b");
    }

    #[test]
    fn reset_preserves_the_two_event_queues() {
        let mut controller = PhaseController::new();
        let mut bus = bus();
        controller.start_game(&mut bus);
        controller.add_pending_action(pending("p1", 1)).unwrap();
        controller.set_player_ready("p1");
        controller.add_pending_disconnect_event(DisconnectRecord {
            player_id: "p2".into(),
            round: 1,
            timestamp: Utc::now(),
        });
        controller.add_pending_passive_activation(PassiveActivation {
            player_id: "p3".into(),
            effect: StatusEffectKind::HealingOverTime,
            amount: 5,
        });

        controller.reset_for_new_round();
        assert!(controller.pending_actions().is_empty());
        assert_eq!(controller.ready_count(), 0);
        assert_eq!(controller.get_pending_disconnect_events().len(), 1);
        assert_eq!(controller.get_pending_passive_activations().len(), 1);
        // The getters drain.
        assert!(controller.get_pending_disconnect_events().is_empty());
        assert!(controller.get_pending_passive_activations().is_empty());
    }

    #[test]
    fn snapshot_round_trips_identically() {
        let mut controller = PhaseController::new();
        let mut bus = bus();
        controller.start_game(&mut bus);
        controller.add_pending_action(pending("p1", 1)).unwrap();
        controller.set_player_ready("p9");
        controller.add_pending_passive_activation(PassiveActivation {
            player_id: "p3".into(),
            effect: StatusEffectKind::Moonbeam,
            amount: 4,
        });

        let restored = PhaseController::from_json(controller.to_json()).unwrap();
        assert_eq!(restored, controller);
    }
}
