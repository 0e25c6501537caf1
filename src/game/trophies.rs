use crate::game::event::TrophyAward;
use crate::game::player::Player;
use crate::game::state::GameState;

/// End-of-game awards computed against final stats. Ties go to the earlier
/// joiner; zero-valued stats award nothing.
pub fn compute_trophies(state: &GameState) -> Vec<TrophyAward> {
    let mut trophies = Vec::new();
    let categories: [(&str, fn(&Player) -> u64); 5] = [
        ("Butcher", |p| p.stats.total_damage_dealt),
        ("Lifeline", |p| p.stats.total_healing_done),
        ("Punching Bag", |p| p.stats.damage_taken),
        ("Haymaker", |p| p.stats.highest_single_hit),
        ("Workhorse", |p| u64::from(p.stats.abilities_used)),
    ];

    for (trophy, metric) in categories {
        let winner = state
            .players()
            .map(|p| (p, metric(p)))
            .filter(|(_, value)| *value > 0)
            .fold(None, |best: Option<(&Player, u64)>, (p, value)| match best {
                Some((_, top)) if top >= value => best,
                _ => Some((p, value)),
            });
        if let Some((player, value)) = winner {
            trophies.push(TrophyAward {
                player_id: player.id.clone(),
                player_name: player.name.clone(),
                trophy: trophy.to_string(),
                value,
            });
        }
    }
    trophies
}
