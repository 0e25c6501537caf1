use serde::{Deserialize, Serialize};

use crate::game::monster::MonsterConfig;

pub mod bus;
pub mod command;
pub mod effects;
pub mod event;
pub mod middleware;
pub mod monster;
pub mod phase;
pub mod player;
pub mod processor;
pub mod resolver;
pub mod room;
pub mod router;
pub mod state;
pub mod trophies;

/// Every per-room tunable in one place. Plain data so deployments can load
/// it from JSON next to the content catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub min_players: usize,
    pub max_players: usize,
    /// Action phase deadline; expiry resolves the round with absentees
    /// treated as having no action.
    pub action_timeout_millis: u64,
    /// Majority-ready fast-forward window in the results phase.
    pub results_grace_millis: u64,
    /// Fraction of living players whose ready flag arms the grace timer.
    pub majority_ready_fraction: f64,
    /// How long a room may sit with every player disconnected.
    pub empty_room_grace_millis: u64,
    pub max_history: usize,
    pub slow_event_millis: u64,
    pub rate_limit_window_millis: u64,
    pub rate_limit_max_events: u32,
    pub strict_validation: bool,
    /// Chance a warlock's touch corrupts, rolled once per qualifying round.
    pub conversion_chance: f64,
    pub monster: MonsterConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 12,
            action_timeout_millis: 60_000,
            results_grace_millis: 3_000,
            majority_ready_fraction: 0.5,
            empty_room_grace_millis: 60_000,
            max_history: 1_000,
            slow_event_millis: 100,
            rate_limit_window_millis: 60_000,
            rate_limit_max_events: 100,
            strict_validation: true,
            conversion_chance: 0.25,
            monster: MonsterConfig::default(),
        }
    }
}
