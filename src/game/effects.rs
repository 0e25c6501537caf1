use serde::{Deserialize, Serialize};

/// Every status effect the resolver knows how to tick. `turnsRemaining = -1`
/// marks a permanent/passive effect (racial passives use this).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusEffectKind {
    Poison,
    Bleed,
    Shielded,
    Invisible,
    Stunned,
    Vulnerable,
    Weakened,
    Enraged,
    HealingOverTime,
    StoneArmor,
    Undying,
    Moonbeam,
    LifeBond,
    SpiritGuard,
    Sanctuary,
}

/// Resolution-order class. Damage effects tick first, then healing, then
/// death triggers such as undying.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TickClass {
    Damage,
    Healing,
    DeathTrigger,
    Neutral,
}

impl StatusEffectKind {
    pub fn tick_class(&self) -> TickClass {
        match self {
            Self::Poison | Self::Bleed => TickClass::Damage,
            Self::HealingOverTime | Self::LifeBond | Self::Moonbeam => TickClass::Healing,
            Self::Undying => TickClass::DeathTrigger,
            Self::Shielded
            | Self::Invisible
            | Self::Stunned
            | Self::Vulnerable
            | Self::Weakened
            | Self::Enraged
            | Self::StoneArmor
            | Self::SpiritGuard
            | Self::Sanctuary => TickClass::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poison => "poison",
            Self::Bleed => "bleed",
            Self::Shielded => "shielded",
            Self::Invisible => "invisible",
            Self::Stunned => "stunned",
            Self::Vulnerable => "vulnerable",
            Self::Weakened => "weakened",
            Self::Enraged => "enraged",
            Self::HealingOverTime => "healingOverTime",
            Self::StoneArmor => "stoneArmor",
            Self::Undying => "undying",
            Self::Moonbeam => "moonbeam",
            Self::LifeBond => "lifeBond",
            Self::SpiritGuard => "spiritGuard",
            Self::Sanctuary => "sanctuary",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEffect {
    #[serde(rename = "type")]
    pub kind: StatusEffectKind,
    pub turns_remaining: i32,
    pub magnitude: i32,
    pub source_player_id: Option<String>,
    pub stackable: bool,
    pub refreshable: bool,
}

impl StatusEffect {
    pub fn is_permanent(&self) -> bool {
        self.turns_remaining < 0
    }
}

/// What `StatusEffects::apply` did with an incoming effect.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ApplyOutcome {
    Added,
    Stacked,
    Refreshed,
    Rejected,
}

/// The ordered set of effects active on one player. Enforces the invariant
/// that at most one non-stackable effect of a given type is present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusEffects {
    effects: Vec<StatusEffect>,
}

impl StatusEffects {
    pub fn apply(&mut self, effect: StatusEffect) -> ApplyOutcome {
        if effect.stackable {
            self.effects.push(effect);
            return ApplyOutcome::Stacked;
        }
        if let Some(existing) = self.effects.iter_mut().find(|e| e.kind == effect.kind) {
            if existing.refreshable {
                existing.turns_remaining = effect.turns_remaining;
                existing.magnitude = existing.magnitude.max(effect.magnitude);
                existing.source_player_id = effect.source_player_id;
                return ApplyOutcome::Refreshed;
            }
            return ApplyOutcome::Rejected;
        }
        self.effects.push(effect);
        ApplyOutcome::Added
    }

    pub fn has(&self, kind: StatusEffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    pub fn get(&self, kind: StatusEffectKind) -> Option<&StatusEffect> {
        self.effects.iter().find(|e| e.kind == kind)
    }

    /// Removes every instance of `kind`; returns whether anything was removed.
    pub fn remove(&mut self, kind: StatusEffectKind) -> bool {
        let before = self.effects.len();
        self.effects.retain(|e| e.kind != kind);
        self.effects.len() != before
    }

    /// Summed magnitude across instances of `kind` (stackable effects add up).
    pub fn magnitude_of(&self, kind: StatusEffectKind) -> i32 {
        self.effects
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.magnitude)
            .sum()
    }

    /// Consumes up to `amount` from the pooled magnitude of `kind` (shield
    /// absorption), dropping instances that hit zero. Returns the amount
    /// actually consumed.
    pub fn consume_magnitude(&mut self, kind: StatusEffectKind, amount: u32) -> u32 {
        let mut remaining = amount;
        for effect in self.effects.iter_mut().filter(|e| e.kind == kind) {
            if remaining == 0 {
                break;
            }
            let pool = effect.magnitude.max(0) as u32;
            let used = pool.min(remaining);
            effect.magnitude -= used as i32;
            remaining -= used;
        }
        self.effects.retain(|e| e.kind != kind || e.magnitude > 0);
        amount - remaining
    }

    /// Decrements every finite duration by one turn and drops the expired
    /// instances, returning their kinds in order.
    pub fn tick_durations(&mut self) -> Vec<StatusEffectKind> {
        let mut expired = Vec::new();
        self.effects.retain_mut(|effect| {
            if effect.is_permanent() {
                return true;
            }
            effect.turns_remaining -= 1;
            if effect.turns_remaining <= 0 {
                expired.push(effect.kind);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusEffect> {
        self.effects.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }
}
