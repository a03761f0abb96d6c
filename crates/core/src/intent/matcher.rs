use std::time::Instant;

use super::cooldown::CooldownTracker;
use super::rules::Rule;

/// Result of matching one phrase against a source's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult<'a> {
    /// First candidate in table order whose action is free to fire.
    Fire(&'a Rule),
    /// Candidates existed but every one was cooling down. Holds the first.
    Suppressed(&'a Rule),
    None,
}

/// Rules whose trigger occurs in `phrase`, in table order.
/// Case-insensitive substring containment: "next" also matches inside "nextgen".
pub fn candidates<'a>(rules: &'a [Rule], phrase: &str) -> impl Iterator<Item = &'a Rule> + 'a {
    let phrase = phrase.to_lowercase();
    rules.iter().filter(move |rule| {
        let trigger = rule.trigger.to_lowercase();
        !trigger.is_empty() && phrase.contains(trigger.as_str())
    })
}

/// Pick the rule to fire: the first candidate not suppressed by cooldown.
/// Does not mark the cooldown; the caller does that when it commits.
pub fn select<'a>(
    rules: &'a [Rule],
    phrase: &'a str,
    cooldowns: &CooldownTracker,
    now: Instant,
) -> MatchResult<'a> {
    let mut first_suppressed = None;
    for rule in candidates(rules, phrase) {
        if cooldowns.is_suppressed(&rule.action, now) {
            tracing::debug!(
                trigger = %rule.trigger,
                action = %rule.action,
                remaining_ms = cooldowns
                    .remaining(&rule.action, now)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
                "trigger on cooldown, skipping"
            );
            first_suppressed.get_or_insert(rule);
            continue;
        }
        return MatchResult::Fire(rule);
    }
    match first_suppressed {
        Some(rule) => MatchResult::Suppressed(rule),
        None => MatchResult::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::rules::{NEXT_SLIDE, OPEN_PRESENTATION, PREVIOUS_SLIDE, RuleTable};
    use std::time::Duration;

    #[test]
    fn substring_inside_longer_phrase_matches() {
        let table = RuleTable::reference();
        let cd = CooldownTracker::default();
        let result = select(table.rules_for("audio_stt"), "go to the next one", &cd, Instant::now());
        assert!(matches!(result, MatchResult::Fire(r) if r.action == NEXT_SLIDE));
    }

    #[test]
    fn substring_inside_unrelated_word_also_matches() {
        let table = RuleTable::reference();
        let cd = CooldownTracker::default();
        let result = select(table.rules_for("audio_stt"), "nextgen", &cd, Instant::now());
        assert!(matches!(result, MatchResult::Fire(r) if r.action == NEXT_SLIDE));
    }

    #[test]
    fn first_rule_in_table_order_wins() {
        let table = RuleTable::reference();
        let cd = CooldownTracker::default();
        let result = select(
            table.rules_for("audio_stt"),
            "open presentation next previous",
            &cd,
            Instant::now(),
        );
        assert!(matches!(result, MatchResult::Fire(r) if r.action == OPEN_PRESENTATION));
    }

    #[test]
    fn suppressed_rule_falls_through_to_next_candidate() {
        let table = RuleTable::reference();
        let mut cd = CooldownTracker::new(Duration::from_secs(2));
        let now = Instant::now();
        cd.mark(NEXT_SLIDE, now);
        let result = select(table.rules_for("audio_stt"), "next previous", &cd, now);
        assert!(matches!(result, MatchResult::Fire(r) if r.action == PREVIOUS_SLIDE));
    }

    #[test]
    fn all_candidates_suppressed() {
        let table = RuleTable::reference();
        let mut cd = CooldownTracker::new(Duration::from_secs(2));
        let now = Instant::now();
        cd.mark(NEXT_SLIDE, now);
        let result = select(table.rules_for("gesture"), "next", &cd, now);
        assert!(matches!(result, MatchResult::Suppressed(r) if r.action == NEXT_SLIDE));
    }

    #[test]
    fn trigger_case_is_ignored() {
        let rules = [Rule {
            source: "gesture".into(),
            trigger: "Next".into(),
            action: NEXT_SLIDE.into(),
            params: Default::default(),
        }];
        let cd = CooldownTracker::default();
        let result = select(&rules, "next", &cd, Instant::now());
        assert!(matches!(result, MatchResult::Fire(r) if r.action == NEXT_SLIDE));
        let result = select(&rules, "NEXT please", &cd, Instant::now());
        assert!(matches!(result, MatchResult::Fire(r) if r.action == NEXT_SLIDE));
    }

    #[test]
    fn no_candidate() {
        let table = RuleTable::reference();
        let cd = CooldownTracker::default();
        assert_eq!(
            select(table.rules_for("audio_stt"), "hello there", &cd, Instant::now()),
            MatchResult::None
        );
        assert_eq!(select(&[], "next", &cd, Instant::now()), MatchResult::None);
    }

    #[test]
    fn multi_word_trigger_needs_contiguous_words() {
        let table = RuleTable::reference();
        let rules = table.rules_for("audio_stt");
        assert_eq!(candidates(rules, "open the presentation").count(), 0);
        assert_eq!(candidates(rules, "please open presentation").count(), 1);
    }
}
