use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::player::PlayerId;

/// Tunables for the shared enemy. Damage scales with `age`, threat decays
/// once per round.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonsterConfig {
    pub base_hp: u32,
    pub hp_per_player: u32,
    pub base_damage: u32,
    pub age_damage_scale: f64,
    pub threat_decay: f64,
}

impl Default for MonsterConfig {
    fn default() -> Self {
        Self {
            base_hp: 100,
            hp_per_player: 50,
            base_damage: 10,
            age_damage_scale: 0.25,
            threat_decay: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monster {
    pub hp: u32,
    pub max_hp: u32,
    pub base_damage: u32,
    pub age: u32,
    threat: HashMap<PlayerId, u32>,
    age_damage_scale: f64,
    threat_decay: f64,
}

impl Monster {
    pub fn spawn(config: &MonsterConfig, player_count: usize) -> Self {
        let max_hp = config.base_hp + config.hp_per_player * player_count as u32;
        Self {
            hp: max_hp,
            max_hp,
            base_damage: config.base_damage,
            age: 0,
            threat: HashMap::new(),
            age_damage_scale: config.age_damage_scale,
            threat_decay: config.threat_decay,
        }
    }

    /// Next spawn after a kill: tougher, and it keeps its age.
    pub fn respawn(&mut self, level: u32) {
        self.max_hp += self.max_hp / 2;
        self.hp = self.max_hp;
        self.base_damage += self.base_damage * level / 4;
        self.threat.clear();
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let lost = amount.min(self.hp);
        self.hp -= lost;
        lost
    }

    pub fn heal(&mut self, amount: u32) -> u32 {
        let restored = amount.min(self.max_hp - self.hp);
        self.hp += restored;
        restored
    }

    pub fn add_threat(&mut self, player_id: &str, amount: u32) {
        *self.threat.entry(player_id.to_string()).or_insert(0) += amount;
    }

    pub fn threat_of(&self, player_id: &str) -> u32 {
        self.threat.get(player_id).copied().unwrap_or(0)
    }

    /// One round of aging: damage grows, old grudges fade.
    pub fn age_round(&mut self) {
        self.age += 1;
        let decay = self.threat_decay;
        self.threat.retain(|_, score| {
            *score = (f64::from(*score) * decay) as u32;
            *score > 0
        });
    }

    pub fn attack_damage(&self) -> u32 {
        let scaled = f64::from(self.base_damage) * (1.0 + self.age_damage_scale * f64::from(self.age));
        scaled.round() as u32
    }

    /// Highest accumulated threat among the candidates, random among ties so
    /// an untouched monster does not always maul the same player.
    pub fn choose_target<R: Rng>(&self, candidates: &[PlayerId], rng: &mut R) -> Option<PlayerId> {
        if candidates.is_empty() {
            return None;
        }
        let top = candidates
            .iter()
            .map(|id| self.threat_of(id))
            .max()
            .unwrap_or(0);
        let pool: Vec<&PlayerId> = candidates
            .iter()
            .filter(|id| self.threat_of(id) == top)
            .collect();
        let pick = rng.gen_range(0..pool.len());
        Some(pool[pick].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn hp_scales_with_player_count() {
        let m = Monster::spawn(&MonsterConfig::default(), 4);
        assert_eq!(m.max_hp, 300);
        assert!(m.is_alive());
    }

    #[test]
    fn damage_scales_with_age() {
        let mut m = Monster::spawn(&MonsterConfig::default(), 2);
        let fresh = m.attack_damage();
        m.age_round();
        m.age_round();
        assert!(m.attack_damage() > fresh);
    }

    #[test]
    fn threat_decays_per_round() {
        let mut m = Monster::spawn(&MonsterConfig::default(), 2);
        m.add_threat("p1", 8);
        m.age_round();
        assert_eq!(m.threat_of("p1"), 4);
        m.age_round();
        m.age_round();
        m.age_round();
        assert_eq!(m.threat_of("p1"), 0);
    }

    #[test]
    fn target_choice_prefers_highest_threat() {
        let mut m = Monster::spawn(&MonsterConfig::default(), 2);
        m.add_threat("p2", 10);
        let mut rng = StdRng::seed_from_u64(1);
        let candidates = vec!["p1".to_string(), "p2".to_string()];
        assert_eq!(m.choose_target(&candidates, &mut rng), Some("p2".to_string()));
    }
}
