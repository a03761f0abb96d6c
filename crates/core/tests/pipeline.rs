//! End-to-end tests for the intent pipeline without a network:
//! Event → phrase aggregation → matching → cooldown gate → dispatch → mock peer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hub_core::config::HubCfg;
use hub_core::intent::rules::{self, Rule, RuleTable};
use hub_core::runtime::Runtime;
use hub_core::types::{ConnectionState, Event, Outcome};
use hub_link::MockConnector;

fn runtime_with(cfg: HubCfg, rules: RuleTable, mock: &MockConnector) -> Runtime {
    let (rt, _status) = Runtime::new(Arc::new(cfg), rules, Arc::new(mock.clone()));
    rt
}

fn reference_runtime(mock: &MockConnector) -> Runtime {
    runtime_with(HubCfg::default(), RuleTable::reference(), mock)
}

/// "open" then "presentation" within the window reconstructs the phrase.
#[tokio::test]
async fn words_within_window_trigger_open_presentation() {
    let mock = MockConnector::new();
    let mut rt = reference_runtime(&mock);
    let t0 = Instant::now();

    rt.handle_event(&Event::at("audio_stt", "open", t0));
    let t1 = t0 + Duration::from_millis(2500);
    let outcome = rt.handle_event(&Event::at("audio_stt", "presentation", t1));

    assert_eq!(rt.recent_phrase("audio_stt", t1), "open presentation");
    assert_eq!(outcome, Outcome::Dispatched { action: rules::OPEN_PRESENTATION.into() });
    rt.dispatcher().settle().await;
    assert_eq!(mock.sent().len(), 1);
    assert_eq!(mock.sent()[0].action, rules::OPEN_PRESENTATION);
}

/// More than three seconds apart, the first word is gone and nothing matches.
#[tokio::test]
async fn words_outside_window_do_not_combine() {
    let mock = MockConnector::new();
    let mut rt = reference_runtime(&mock);
    let t0 = Instant::now();

    rt.handle_event(&Event::at("audio_stt", "open", t0));
    let t1 = t0 + Duration::from_millis(3500);
    let outcome = rt.handle_event(&Event::at("audio_stt", "presentation", t1));

    assert_eq!(rt.recent_phrase("audio_stt", t1), "presentation");
    assert_eq!(outcome, Outcome::NoMatch);
    rt.dispatcher().settle().await;
    assert!(mock.sent().is_empty());
}

/// Two NEXT_SLIDE within the cooldown dispatch once; after it elapses, again.
#[tokio::test]
async fn cooldown_limits_repeat_dispatch() {
    let mock = MockConnector::new();
    let mut rt = reference_runtime(&mock);
    let t0 = Instant::now();

    let first = rt.handle_event(&Event::at("gesture", "next", t0));
    let second = rt.handle_event(&Event::at("gesture", "next", t0 + Duration::from_millis(800)));
    let third = rt.handle_event(&Event::at("gesture", "next", t0 + Duration::from_millis(2100)));

    assert_eq!(first, Outcome::Dispatched { action: rules::NEXT_SLIDE.into() });
    assert_eq!(second, Outcome::Suppressed { action: rules::NEXT_SLIDE.into() });
    assert_eq!(third, Outcome::Dispatched { action: rules::NEXT_SLIDE.into() });

    rt.dispatcher().settle().await;
    assert_eq!(mock.sent().len(), 2);
    assert_eq!(rt.status().suppressed, 1);
}

/// Cooldown is per action, shared across sources.
#[tokio::test]
async fn cooldown_is_shared_between_sources() {
    let mock = MockConnector::new();
    let mut rt = reference_runtime(&mock);
    let t0 = Instant::now();

    rt.handle_event(&Event::at("gesture", "next", t0));
    let voice = rt.handle_event(&Event::at("audio_stt", "next", t0 + Duration::from_millis(300)));
    assert_eq!(voice, Outcome::Suppressed { action: rules::NEXT_SLIDE.into() });
}

/// Vision "cardboard" is recognized as ZOOM_ON_OBJECT but never sent.
#[tokio::test]
async fn vision_zoom_is_not_sent_downstream() {
    let mock = MockConnector::new();
    let mut rt = reference_runtime(&mock);

    let outcome = rt.handle_event(&Event::new("vision_vlm", "Cardboard"));
    assert_eq!(outcome, Outcome::Recognized { action: rules::ZOOM_ON_OBJECT.into() });

    rt.dispatcher().settle().await;
    assert!(mock.sent().is_empty());
    assert_eq!(mock.connect_attempts(), 0);
}

/// A dispatch while disconnected makes exactly one connect attempt; on
/// failure the command is dropped and the link stays disconnected.
#[tokio::test]
async fn failed_connect_drops_command() {
    let mock = MockConnector::refusing();
    let mut rt = reference_runtime(&mock);

    rt.handle_event(&Event::new("gesture", "previous"));
    rt.dispatcher().settle().await;

    assert_eq!(mock.connect_attempts(), 1);
    assert!(mock.sent().is_empty());
    assert_eq!(rt.link().state(), ConnectionState::Disconnected);
    assert_eq!(rt.dispatcher().stats().dropped, 1);

    // The peer comes up: the next distinct command reconnects lazily.
    mock.refuse_connections(false);
    rt.handle_event(&Event::new("gesture", "next"));
    rt.dispatcher().settle().await;
    assert_eq!(mock.connect_attempts(), 2);
    assert_eq!(mock.sent().len(), 1);
    assert_eq!(rt.link().state(), ConnectionState::Connected);
}

/// N+1 rapid words leave only the most recent N in the phrase.
#[tokio::test]
async fn capacity_evicts_oldest_word() {
    let mock = MockConnector::new();
    let cfg = HubCfg {
        phrase_capacity: 4,
        ..HubCfg::default()
    };
    let mut rt = runtime_with(cfg, RuleTable::reference(), &mock);
    let t0 = Instant::now();

    for (i, word) in ["one", "two", "three", "four", "five"].iter().enumerate() {
        rt.handle_event(&Event::at("audio_stt", *word, t0 + Duration::from_millis(50 * i as u64)));
    }
    assert_eq!(
        rt.recent_phrase("audio_stt", t0 + Duration::from_millis(300)),
        "two three four five"
    );
}

/// Replaying a processed event inside the cooldown produces no second dispatch.
#[tokio::test]
async fn replayed_event_is_idempotent_within_cooldown() {
    let mock = MockConnector::new();
    let mut rt = reference_runtime(&mock);
    let event = Event::new("audio_stt", "previous");

    assert!(matches!(rt.handle_event(&event), Outcome::Dispatched { .. }));
    assert!(matches!(rt.handle_event(&event), Outcome::Suppressed { .. }));

    rt.dispatcher().settle().await;
    assert_eq!(mock.sent().len(), 1);
}

/// First non-suppressed rule in table order wins; only one action per event.
#[tokio::test]
async fn one_action_per_event_in_table_order() {
    let mock = MockConnector::new();
    let table = RuleTable::new([
        Rule::new("gesture", "swipe", rules::NEXT_SLIDE),
        Rule::new("gesture", "swipe left", rules::PREVIOUS_SLIDE),
        Rule::new("gesture", "left", rules::GO_TO_SLIDE).with_param("page", "1"),
    ]);
    let mut rt = runtime_with(HubCfg::default(), table, &mock);
    let t0 = Instant::now();

    let first = rt.handle_event(&Event::at("gesture", "swipe left", t0));
    assert_eq!(first, Outcome::Dispatched { action: rules::NEXT_SLIDE.into() });

    // NEXT_SLIDE is cooling down, so the second candidate fires.
    let second = rt.handle_event(&Event::at("gesture", "swipe left", t0 + Duration::from_millis(10)));
    assert_eq!(second, Outcome::Dispatched { action: rules::PREVIOUS_SLIDE.into() });

    let third = rt.handle_event(&Event::at("gesture", "swipe left", t0 + Duration::from_millis(20)));
    assert_eq!(third, Outcome::Dispatched { action: rules::GO_TO_SLIDE.into() });

    rt.dispatcher().settle().await;
    let sent = mock.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2].params.get("page").map(String::as_str), Some("1"));
}

/// A custom word-stream source gets its own phrase window.
#[tokio::test]
async fn configured_word_stream_source() {
    let mock = MockConnector::new();
    let cfg = HubCfg {
        word_stream_sources: vec!["whisper".into()],
        ..HubCfg::default()
    };
    let table = RuleTable::new([Rule::new("whisper", "next slide", rules::NEXT_SLIDE)]);
    let mut rt = runtime_with(cfg, table, &mock);
    let t0 = Instant::now();

    assert_eq!(rt.handle_event(&Event::at("whisper", "next", t0)), Outcome::NoMatch);
    let outcome = rt.handle_event(&Event::at("whisper", "slide", t0 + Duration::from_millis(400)));
    assert_eq!(outcome, Outcome::Dispatched { action: rules::NEXT_SLIDE.into() });
}

/// Shutdown drains pending deliveries and closes the link.
#[tokio::test]
async fn shutdown_drains_and_disconnects() {
    let mock = MockConnector::new().with_send_delay(Duration::from_millis(30));
    let mut rt = reference_runtime(&mock);

    rt.handle_event(&Event::new("gesture", "next"));
    rt.shutdown().await;

    assert_eq!(mock.sent().len(), 1);
    assert_eq!(rt.dispatcher().in_flight(), 0);
    assert_eq!(rt.link().state(), ConnectionState::Disconnected);
}

/// Intents matched back to back reach the peer in match order on a
/// work-stealing scheduler.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn matched_intents_arrive_in_order() {
    let mock = MockConnector::new();
    let rt = reference_runtime(&mock);

    let handle = tokio::spawn(async move {
        let mut rt = rt;
        let t0 = Instant::now();
        rt.handle_event(&Event::at("audio_stt", "open presentation", t0));
        rt.handle_event(&Event::at("gesture", "next", t0));
        rt.handle_event(&Event::at("gesture", "previous", t0));
        rt.dispatcher().settle().await;
        rt
    });
    let rt = handle.await.unwrap();

    let sent: Vec<String> = mock.sent().into_iter().map(|c| c.action).collect();
    assert_eq!(sent, [rules::OPEN_PRESENTATION, rules::NEXT_SLIDE, rules::PREVIOUS_SLIDE]);
    assert_eq!(rt.dispatcher().stats().delivered, 3);
}
