use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Prefix for environment overrides: `HUB_COOLDOWN_MS=1500` sets `cooldown_ms`.
pub const ENV_PREFIX: &str = "HUB_";

/// All hub parameters. Every key may be unset; defaults are the reference values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubCfg {
    // endpoints
    pub listen_addr: String,
    pub downstream_url: String,

    // phrase aggregation
    pub phrase_window_ms: u64,
    pub phrase_capacity: usize,
    pub word_stream_sources: Vec<String>,

    // dedup
    pub cooldown_ms: u64,

    // dispatch
    pub send_timeout_ms: u64,
    pub event_buffer: usize,
    pub dispatch_queue: usize,

    // shutdown
    pub shutdown_timeout_secs: u64,

    // rule table (None = built-in reference rules)
    pub rules_path: Option<String>,
}

impl Default for HubCfg {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9001".into(),
            downstream_url: "ws://localhost:9002/control".into(),
            phrase_window_ms: 3000,
            phrase_capacity: 10,
            word_stream_sources: vec!["audio_stt".into()],
            cooldown_ms: 2000,
            send_timeout_ms: 3000,
            event_buffer: 256,
            dispatch_queue: 64,
            shutdown_timeout_secs: 5,
            rules_path: None,
        }
    }
}

impl HubCfg {
    /// Load overrides from `HUB_*` environment variables.
    pub fn from_env() -> Self {
        let map: HashMap<String, String> = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .map(|key| (key.to_ascii_lowercase(), v))
            })
            .collect();
        Self::from_map(&map)
    }

    /// Build from a key/value map. Missing or unparsable values fall back to defaults.
    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            listen_addr: get_or(m, "listen_addr", d.listen_addr),
            downstream_url: get_or(m, "downstream_url", d.downstream_url),
            phrase_window_ms: get_or(m, "phrase_window_ms", d.phrase_window_ms),
            phrase_capacity: get_or(m, "phrase_capacity", d.phrase_capacity),
            word_stream_sources: m
                .get("word_stream_sources")
                .map(|v| split_list(v))
                .unwrap_or(d.word_stream_sources),
            cooldown_ms: get_or(m, "cooldown_ms", d.cooldown_ms),
            send_timeout_ms: get_or(m, "send_timeout_ms", d.send_timeout_ms),
            event_buffer: get_or(m, "event_buffer", d.event_buffer).max(1),
            dispatch_queue: get_or(m, "dispatch_queue", d.dispatch_queue).max(1),
            shutdown_timeout_secs: get_or(m, "shutdown_timeout_secs", d.shutdown_timeout_secs),
            rules_path: m
                .get("rules_path")
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty()),
        }
    }

    pub fn phrase_window(&self) -> Duration {
        Duration::from_millis(self.phrase_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Key, current value and description of every setting, for the startup log.
    pub fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("listen_addr", self.listen_addr.clone(), "Perception agent listen address"),
            ("downstream_url", self.downstream_url.clone(), "Downstream command peer URL"),
            ("phrase_window_ms", self.phrase_window_ms.to_string(), "Max age of buffered words"),
            ("phrase_capacity", self.phrase_capacity.to_string(), "Max buffered words per source"),
            ("word_stream_sources", self.word_stream_sources.join(","), "Sources whose content arrives word by word"),
            ("cooldown_ms", self.cooldown_ms.to_string(), "Min interval between repeats of one action"),
            ("send_timeout_ms", self.send_timeout_ms.to_string(), "Downstream connect/send timeout"),
            ("event_buffer", self.event_buffer.to_string(), "Inbound event channel capacity"),
            ("dispatch_queue", self.dispatch_queue.to_string(), "Commands waiting for downstream delivery"),
            ("shutdown_timeout_secs", self.shutdown_timeout_secs.to_string(), "Graceful shutdown timeout seconds"),
            ("rules_path", self.rules_path.clone().unwrap_or_default(), "Rule table JSON file (empty = built-in)"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
