use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hub_link::{Command, Connector};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::HubCfg;
use crate::dispatch::{ConnectionManager, Dispatcher};
use crate::intent::matcher::{self, MatchResult};
use crate::intent::{CooldownTracker, RuleTable};
use crate::io::input::{EventReceiver, preview};
use crate::sensory::PhraseAggregator;
use crate::types::{Event, HubStatus, Outcome};

const LOG_PREVIEW_CHARS: usize = 50;

/// The intent orchestrator: owns phrase windows, cooldowns and the dispatcher.
///
/// All matching state is mutated synchronously in `handle_event`, so the
/// cooldown gate is checked and marked before any command is queued.
pub struct Runtime {
    cfg: Arc<HubCfg>,
    rules: RuleTable,
    phrases: PhraseAggregator,
    cooldowns: CooldownTracker,
    dispatcher: Dispatcher,
    status: HubStatus,
    /// Snapshot broadcast after every handled event.
    status_tx: watch::Sender<HubStatus>,
}

impl Runtime {
    /// Create a runtime delivering through `connector`.
    /// Returns the runtime and a receiver for its status snapshots.
    pub fn new(
        cfg: Arc<HubCfg>,
        rules: RuleTable,
        connector: Arc<dyn Connector>,
    ) -> (Self, watch::Receiver<HubStatus>) {
        let link = Arc::new(ConnectionManager::new(connector, cfg.send_timeout()));
        let phrases = PhraseAggregator::new(
            cfg.word_stream_sources.iter().cloned(),
            cfg.phrase_capacity,
            cfg.phrase_window(),
        );
        let cooldowns = CooldownTracker::new(cfg.cooldown());
        let dispatcher = Dispatcher::new(link, cfg.dispatch_queue);
        let (status_tx, status_rx) = watch::channel(HubStatus::default());
        let runtime = Self {
            cfg,
            rules,
            phrases,
            cooldowns,
            dispatcher,
            status: HubStatus::default(),
            status_tx,
        };
        (runtime, status_rx)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn link(&self) -> &Arc<ConnectionManager> {
        self.dispatcher.link()
    }

    pub fn status(&self) -> &HubStatus {
        &self.status
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Current phrase buffered for a word-stream source.
    pub fn recent_phrase(&mut self, source: &str, now: Instant) -> String {
        self.phrases.recent_phrase(source, now)
    }

    /// Log the configured rule table, one line per rule.
    pub fn log_rules(&self) {
        for source in self.rules.sources() {
            for rule in self.rules.rules_for(source) {
                tracing::info!(
                    source,
                    trigger = %rule.trigger,
                    action = %rule.action,
                    word_stream = self.phrases.is_word_stream(source),
                    "configured rule"
                );
            }
        }
    }

    /// Match one event and, if a rule fires, dispatch its command.
    /// At most one action fires per event.
    pub fn handle_event(&mut self, event: &Event) -> Outcome {
        self.status.events += 1;
        let now = event.received_at;
        let content = event.content.trim();

        let outcome = if content.is_empty() {
            Outcome::Ignored
        } else {
            tracing::info!(
                event_id = %event.id,
                source = %event.source,
                content = %preview(content, LOG_PREVIEW_CHARS),
                "received event"
            );
            self.match_and_dispatch(event, content, now)
        };

        self.record(&outcome);
        outcome
    }

    fn match_and_dispatch(&mut self, event: &Event, content: &str, now: Instant) -> Outcome {
        let phrase = self.phrases.ingest(&event.source, content, now);
        if self.phrases.is_word_stream(&event.source) {
            tracing::debug!(source = %event.source, phrase = %phrase, "phrase buffer");
        }

        let rules = self.rules.rules_for(&event.source);
        match matcher::select(rules, &phrase, &self.cooldowns, now) {
            MatchResult::None => {
                tracing::trace!(source = %event.source, phrase = %phrase, "no rule matched");
                Outcome::NoMatch
            }
            MatchResult::Suppressed(rule) => Outcome::Suppressed {
                action: rule.action.clone(),
            },
            MatchResult::Fire(rule) => {
                tracing::info!(
                    event_id = %event.id,
                    source = %event.source,
                    trigger = %rule.trigger,
                    action = %rule.action,
                    params = ?rule.params,
                    phrase = %preview(&phrase, LOG_PREVIEW_CHARS),
                    "intent recognized"
                );
                let command = Command::new(rule.action.clone(), rule.params.clone());
                self.cooldowns.mark(&command.action, now);
                let action = command.action.clone();
                if self.dispatcher.dispatch(command) {
                    Outcome::Dispatched { action }
                } else {
                    Outcome::Recognized { action }
                }
            }
        }
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Suppressed { .. } => self.status.suppressed += 1,
            Outcome::Dispatched { action } | Outcome::Recognized { action } => {
                self.status.matched += 1;
                if matches!(outcome, Outcome::Dispatched { .. }) {
                    self.status.dispatched += 1;
                } else {
                    self.status.recognized_only += 1;
                }
                self.status.last_action = Some(action.clone());
                self.status.last_intent_at = Some(Utc::now());
            }
            Outcome::Ignored | Outcome::NoMatch => {}
        }
        self.status_tx.send_replace(self.status.clone());
    }

    /// Consume events until the channel closes or `token` is cancelled, then shut down.
    pub async fn run(&mut self, mut events: EventReceiver, token: CancellationToken) {
        self.log_rules();
        if !self.link().warm_up().await {
            tracing::warn!(
                endpoint = %self.link().endpoint(),
                "slide control unavailable until the downstream peer is running"
            );
        }
        tracing::info!("ready to receive perception events");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(events = self.status.events, "shutdown signal received, exiting event loop");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event);
                    }
                    None => {
                        tracing::info!("event channel closed, exiting event loop");
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
    }

    /// Drain in-flight deliveries (bounded) and close the downstream connection.
    pub async fn shutdown(&self) {
        let drained = self.dispatcher.shutdown(self.cfg.shutdown_timeout()).await;
        self.link().close().await;
        let stats = self.dispatcher.stats();
        tracing::info!(
            drained,
            delivered = stats.delivered,
            dropped = stats.dropped,
            matched = self.status.matched,
            suppressed = self.status.suppressed,
            "intent hub stopped"
        );
    }
}
