use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const OPEN_PRESENTATION: &str = "OPEN_PRESENTATION";
pub const NEXT_SLIDE: &str = "NEXT_SLIDE";
pub const PREVIOUS_SLIDE: &str = "PREVIOUS_SLIDE";
pub const GO_TO_SLIDE: &str = "GO_TO_SLIDE";
pub const ZOOM_ON_OBJECT: &str = "ZOOM_ON_OBJECT";

/// Actions delivered to the downstream slide controller. Anything else is
/// recognized and logged only.
pub const FORWARDED_ACTIONS: [&str; 4] = [OPEN_PRESENTATION, NEXT_SLIDE, PREVIOUS_SLIDE, GO_TO_SLIDE];

pub fn is_forwarded(action: &str) -> bool {
    FORWARDED_ACTIONS.contains(&action)
}

/// One trigger → action mapping for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub source: String,
    /// Lowercased by the constructors; matching ignores case either way.
    pub trigger: String,
    pub action: String,
    pub params: BTreeMap<String, String>,
}

impl Rule {
    pub fn new(source: &str, trigger: &str, action: &str) -> Self {
        Self {
            source: source.to_owned(),
            trigger: trigger.to_lowercase(),
            action: action.to_owned(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_owned(), value.to_owned());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("read rule file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse rule table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rule {index} for source '{source_id}' has an empty trigger")]
    EmptyTrigger { source_id: String, index: usize },
}

#[derive(Deserialize)]
struct RuleEntry {
    trigger: String,
    action: String,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

/// Static source → ordered rules mapping. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    by_source: BTreeMap<String, Vec<Rule>>,
}

impl RuleTable {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut by_source: BTreeMap<String, Vec<Rule>> = BTreeMap::new();
        for rule in rules {
            by_source.entry(rule.source.clone()).or_default().push(rule);
        }
        Self { by_source }
    }

    /// The rules shipped with the hub: voice and gesture slide navigation,
    /// vision object zoom.
    pub fn reference() -> Self {
        Self::new([
            Rule::new("audio_stt", "open presentation", OPEN_PRESENTATION),
            Rule::new("audio_stt", "next", NEXT_SLIDE),
            Rule::new("audio_stt", "previous", PREVIOUS_SLIDE),
            Rule::new("vision_vlm", "cardboard", ZOOM_ON_OBJECT).with_param("target", "cardboard"),
            Rule::new("vision_vlm", "person", ZOOM_ON_OBJECT).with_param("target", "person"),
            Rule::new("vision_vlm", "bottle", ZOOM_ON_OBJECT).with_param("target", "bottle"),
            Rule::new("gesture", "next", NEXT_SLIDE),
            Rule::new("gesture", "previous", PREVIOUS_SLIDE),
        ])
    }

    /// Parse `{ "<source>": [ { "trigger", "action", "params"? }, ... ] }`.
    /// Rule order within a source is preserved.
    pub fn from_json(text: &str) -> Result<Self, RulesError> {
        let raw: BTreeMap<String, Vec<RuleEntry>> = serde_json::from_str(text)?;
        let mut rules = Vec::new();
        for (source, entries) in raw {
            for (index, entry) in entries.into_iter().enumerate() {
                if entry.trigger.trim().is_empty() {
                    return Err(RulesError::EmptyTrigger {
                        source_id: source,
                        index,
                    });
                }
                rules.push(Rule {
                    source: source.clone(),
                    trigger: entry.trigger.trim().to_lowercase(),
                    action: entry.action,
                    params: entry.params,
                });
            }
        }
        Ok(Self::new(rules))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Rules for a source in table order. Unknown sources have none.
    pub fn rules_for(&self, source: &str) -> &[Rule] {
        self.by_source.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.by_source.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.by_source.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
