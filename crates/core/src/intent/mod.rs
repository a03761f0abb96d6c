pub mod cooldown;
pub mod matcher;
pub mod rules;

pub use cooldown::CooldownTracker;
pub use matcher::MatchResult;
pub use rules::{Rule, RuleTable, RulesError};
