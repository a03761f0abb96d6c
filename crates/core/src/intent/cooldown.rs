use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-action last-trigger registry.
/// Entries are only ever overwritten; the action set is bounded by the rule table.
#[derive(Debug)]
pub struct CooldownTracker {
    last_fired: HashMap<String, Instant>,
    cooldown: Duration,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_fired: HashMap::new(),
            cooldown,
        }
    }

    /// True while `now - last_fired < cooldown`.
    pub fn is_suppressed(&self, action: &str, now: Instant) -> bool {
        self.last_fired
            .get(action)
            .is_some_and(|&t| now.saturating_duration_since(t) < self.cooldown)
    }

    pub fn mark(&mut self, action: &str, now: Instant) {
        self.last_fired.insert(action.to_owned(), now);
    }

    /// Time left before `action` may fire again.
    pub fn remaining(&self, action: &str, now: Instant) -> Option<Duration> {
        let t = self.last_fired.get(action)?;
        self.cooldown
            .checked_sub(now.saturating_duration_since(*t))
            .filter(|d| !d.is_zero())
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
