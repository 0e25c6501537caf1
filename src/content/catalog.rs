use serde::{Deserialize, Serialize};

use crate::content::dispatch::{DispatchRequest, EffectOutcome};
use crate::game::effects::StatusEffectKind;

/// Per-race baseline modifiers applied at character selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceAttributes {
    /// Multiplier on the base hit-point pool.
    pub hp_modifier: f64,
    /// Fraction of incoming damage shaved off before flat armor.
    pub armor_modifier: f64,
    /// Multiplier on outgoing damage.
    pub damage_modifier: f64,
    pub compatible_classes: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageLimit {
    Passive,
    PerGame,
    PerRound,
    PerTurn,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RacialAbilityDef {
    pub id: String,
    pub name: String,
    pub usage_limit: UsageLimit,
    pub max_uses: u32,
    pub cooldown: u32,
    /// Effect-specific knobs the dispatcher reads (open shape on purpose).
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbilityTarget {
    /// Always the actor; an explicit target id is ignored.
    #[serde(rename = "self")]
    Slf,
    /// A single player; defaults to nothing, must be specified.
    Player,
    /// The monster only.
    Monster,
    /// A single player or the monster.
    Any,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbilityCategory {
    Attack,
    Defense,
    Heal,
    Special,
}

/// Actor-health prerequisite on an ability.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthRequirement {
    Absolute(u32),
    Fraction(f64),
}

/// An effect an ability applies on hit.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSpec {
    pub kind: StatusEffectKind,
    pub turns: i32,
    pub magnitude: i32,
}

/// One class ability. All definitions conform to this record; optional
/// fields stay unset rather than being probed for at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityDef {
    pub id: String,
    pub name: String,
    pub category: AbilityCategory,
    pub unlock_at: u32,
    /// Higher executes first during resolution.
    pub priority: i32,
    pub target: AbilityTarget,
    pub cooldown: u32,
    #[serde(default)]
    pub can_target_dead: bool,
    /// Base damage or healing the dispatcher scales.
    #[serde(default)]
    pub base_amount: u32,
    #[serde(default)]
    pub effect: Option<EffectSpec>,
    /// Makes the target's hidden role public on hit.
    #[serde(default)]
    pub reveals_target: bool,
    #[serde(default)]
    pub requires_health: Option<HealthRequirement>,
    #[serde(default)]
    pub requires_effect: Option<StatusEffectKind>,
    #[serde(default)]
    pub prohibited_effects: Vec<StatusEffectKind>,
    #[serde(default)]
    pub requires_class: Option<String>,
    #[serde(default)]
    pub requires_race: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEffectDefaults {
    pub turns: i32,
    pub stackable: bool,
    pub refreshable: bool,
    pub magnitude: i32,
}

/// Read-only game content, loaded once at startup and shared across rooms.
/// The core never reaches past this interface.
pub trait ContentCatalog: Send + Sync {
    fn races(&self) -> Vec<&str>;
    fn classes(&self) -> Vec<&str>;

    fn race_attributes(&self, race: &str) -> Option<&RaceAttributes>;
    fn racial_ability(&self, race: &str) -> Option<&RacialAbilityDef>;
    fn class_abilities(&self, class: &str) -> Option<&[AbilityDef]>;

    fn status_effect_defaults(&self, kind: StatusEffectKind) -> StatusEffectDefaults;

    /// Base hit points before race modifiers.
    fn base_hp(&self) -> u32;

    /// Damage/heal multiplier granted per extra ally on the same target.
    fn coordination_bonus_per_ally(&self) -> f64;

    /// Resolves one validated ability use into its effect stream. Pure with
    /// respect to room state: outcomes are applied by the caller.
    fn dispatch_ability(&self, request: DispatchRequest<'_>) -> Vec<EffectOutcome>;

    fn ability(&self, class: &str, ability_id: &str) -> Option<&AbilityDef> {
        self.class_abilities(class)?
            .iter()
            .find(|a| a.id == ability_id)
    }

    /// Looks an ability up across every class; adaptability swaps may leave
    /// a player holding another class's ability.
    fn find_ability(&self, ability_id: &str) -> Option<&AbilityDef> {
        self.classes()
            .into_iter()
            .find_map(|class| self.ability(class, ability_id))
    }

    /// Default-built status effect for `kind`, magnitude overridable.
    fn build_effect(
        &self,
        kind: StatusEffectKind,
        source: Option<String>,
        magnitude: Option<i32>,
        turns: Option<i32>,
    ) -> crate::game::effects::StatusEffect {
        let defaults = self.status_effect_defaults(kind);
        crate::game::effects::StatusEffect {
            kind,
            turns_remaining: turns.unwrap_or(defaults.turns),
            magnitude: magnitude.unwrap_or(defaults.magnitude),
            source_player_id: source,
            stackable: defaults.stackable,
            refreshable: defaults.refreshable,
        }
    }
}
