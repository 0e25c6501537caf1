pub mod catalog;
pub mod defaults;
pub mod dispatch;

pub use catalog::{
    AbilityCategory, AbilityDef, AbilityTarget, ContentCatalog, HealthRequirement,
    RaceAttributes, RacialAbilityDef, StatusEffectDefaults, UsageLimit,
};
pub use defaults::StaticCatalog;
pub use dispatch::{CoordinationInfo, DispatchRequest, DispatchTarget, EffectOutcome, TargetRef};
