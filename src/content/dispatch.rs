use crate::content::catalog::AbilityDef;
use crate::game::effects::{StatusEffect, StatusEffectKind};
use crate::game::monster::Monster;
use crate::game::player::{Player, PlayerId, RacialModifiers};

/// Who an effect outcome lands on.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TargetRef {
    Player(PlayerId),
    Monster,
}

/// How many distinct living actors aimed at the same entity this round.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoordinationInfo {
    pub allies_on_target: usize,
}

#[derive(Clone, Copy, Debug)]
pub enum DispatchTarget<'a> {
    Player(&'a Player),
    Monster(&'a Monster),
    None,
}

/// Everything a catalog needs to resolve one validated ability use.
pub struct DispatchRequest<'a> {
    pub actor: &'a Player,
    pub target: DispatchTarget<'a>,
    pub ability: &'a AbilityDef,
    pub round: u32,
    pub coordination: CoordinationInfo,
    pub racial: RacialModifiers,
}

/// The effect stream a dispatch produces. Outcomes are declarative; the
/// resolver applies them to room state and emits the combat events.
#[derive(Clone, Debug)]
pub enum EffectOutcome {
    Damage {
        target: TargetRef,
        amount: u32,
    },
    Heal {
        target: TargetRef,
        amount: u32,
    },
    ApplyEffect {
        target: TargetRef,
        effect: StatusEffect,
    },
    RemoveEffect {
        target: TargetRef,
        kind: StatusEffectKind,
    },
    AddThreat {
        player_id: PlayerId,
        amount: u32,
    },
    /// Keen senses and true sight: the target's hidden role becomes public.
    RevealRole {
        player_id: PlayerId,
    },
    /// A warlock touched a good-aligned player; the resolver rolls the dice.
    CorruptionChance {
        target: PlayerId,
        converter: PlayerId,
    },
}

impl<'a> DispatchTarget<'a> {
    pub fn target_ref(&self) -> Option<TargetRef> {
        match self {
            Self::Player(p) => Some(TargetRef::Player(p.id.clone())),
            Self::Monster(_) => Some(TargetRef::Monster),
            Self::None => None,
        }
    }

    pub fn player(&self) -> Option<&'a Player> {
        match self {
            Self::Player(p) => Some(p),
            _ => None,
        }
    }
}
